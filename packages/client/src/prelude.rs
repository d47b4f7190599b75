//! The essential types for making requests.

pub use crate::chunked::ChunkedBodyReader;
pub use crate::config::{RetryPolicy, SessionConfig};
pub use crate::error::{Error, Result};
pub use crate::headers::Headers;
pub use crate::request::{Body, Credentials, Method, RequestOptions};
pub use crate::response::{Response, ResponseBody};
pub use crate::session::Session;

// URL handling
pub use url::Url;
