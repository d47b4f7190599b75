//! Cache entry

use bytes::Bytes;
use chrono::{DateTime, Utc};

use super::http_date::parse_http_date;
use crate::headers::Headers;
use crate::response::{Response, ResponseBody};

/// One cached response, keyed by its request URL.
///
/// Only fully-buffered responses are cached, so the body is always a
/// byte buffer here. Cloning is cheap: `Bytes` is reference-counted.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub status: u16,
    pub headers: Headers,
    pub charset: Option<String>,
    pub body: Bytes,
    /// Body byte length, the unit the cache's running total is kept in.
    pub size: u64,
}

impl CacheEntry {
    /// Builds an entry from a buffered response. `None` for streamed
    /// bodies, which must never be cached.
    #[must_use]
    pub fn from_response(response: &Response) -> Option<Self> {
        let body = match &response.body {
            ResponseBody::Buffered(bytes) => bytes.clone(),
            ResponseBody::Empty => Bytes::new(),
            ResponseBody::Streamed(_) => return None,
        };
        let size = body.len() as u64;
        Some(CacheEntry {
            status: response.status,
            headers: response.headers.clone(),
            charset: response.charset.clone(),
            body,
            size,
        })
    }

    /// The validator the next conditional GET should echo back.
    #[must_use]
    pub fn etag(&self) -> Option<&str> {
        self.headers.get("etag")
    }

    /// The server `Date` header, the eviction ordering key.
    #[must_use]
    pub fn date(&self) -> Option<DateTime<Utc>> {
        self.headers.get("date").and_then(parse_http_date)
    }

    /// Reconstitutes the response handed back on a 304 revalidation.
    #[must_use]
    pub fn to_response(&self) -> Response {
        Response {
            status: self.status,
            headers: self.headers.clone(),
            charset: self.charset.clone(),
            body: if self.body.is_empty() {
                ResponseBody::Empty
            } else {
                ResponseBody::Buffered(self.body.clone())
            },
        }
    }
}
