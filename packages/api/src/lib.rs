//! # sofa
//!
//! Client for JSON document databases speaking plain HTTP, built on
//! the blocking [`sofa_client`] transport. This crate is the thin
//! public surface: a [`Resource`] maps `(base URL, path segments,
//! query params)` onto transport requests and speaks JSON on both
//! sides, while the transport underneath handles connection pooling,
//! ETag caching, redirects and retries.
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use serde_json::Value;
//! use sofa::{Resource, Session};
//!
//! fn main() -> Result<(), sofa::Error> {
//!     let session = Arc::new(Session::new()?);
//!     let db = Resource::new(session, "http://localhost:5984/mydb")?;
//!     let doc: Value = db.get(Some("doc1"), None::<&()>)?;
//!     println!("{}", doc["_id"]);
//!     Ok(())
//! }
//! ```

#![deny(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

pub mod resource;

pub use resource::{Error, Resource, Result};

// Re-export the transport types callers interact with.
pub use sofa_client::{
    Body, ChunkedBodyReader, Credentials, Headers, Method, RequestOptions, Response, ResponseBody,
    RetryPolicy, Session, SessionConfig,
};
pub use url::Url;
