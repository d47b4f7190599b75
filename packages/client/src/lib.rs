//! # sofa_client
//!
//! Blocking HTTP/1.1 transport for JSON document databases. This is
//! the persistence channel of the `sofa` crate: four verbs against a
//! document store, with the wire mechanics a long-running client
//! needs done properly:
//!
//! - **Connection reuse** through a keep-alive pool keyed by
//!   `(scheme, host:port)`
//! - **Retry** of transient socket failures over a finite,
//!   configurable delay schedule
//! - **Redirect following**, with 301 targets memoized for the life
//!   of the session
//! - **Conditional GET**: ETag responses are cached (size-bounded,
//!   oldest-`Date`-first eviction) and revalidated with
//!   `If-None-Match`
//! - **Chunked transfer decoding**, buffered or handed to the caller
//!   as a live line stream
//! - **Rustls TLS** with native root certificates
//!
//! Calls are synchronous and blocking; any number of threads may share
//! one [`Session`]. There is no async runtime underneath.

#![deny(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

pub mod cache;
pub mod chunked;
pub mod config;
pub mod connect;
pub mod error;
pub mod headers;
pub mod prelude;
pub mod redirect;
pub mod request;
pub mod response;
pub mod session;

mod executor;

pub use cache::{CacheEntry, ResponseCache};
pub use chunked::ChunkedBodyReader;
pub use config::{RetryPolicy, SessionConfig};
pub use connect::{Connection, ConnectionPool};
pub use error::{Error, Result};
pub use headers::Headers;
pub use redirect::PermanentRedirectTable;
pub use request::{Body, Credentials, Method, RequestOptions};
pub use response::{Response, ResponseBody};
pub use session::Session;
