//! Response type
//!
//! A [`Response`] is the normalized result of one request: status,
//! headers with their casing smoothed over, a resolved charset and a
//! body that is either buffered bytes or, for chunked feeds the caller
//! opted into, a live [`ChunkedBodyReader`] that owns its connection.

use bytes::Bytes;

use crate::chunked::ChunkedBodyReader;
use crate::connect::Connection;
use crate::headers::Headers;

/// The body of a response.
pub enum ResponseBody {
    Empty,
    Buffered(Bytes),
    /// A chunked body still on the wire. The reader owns the
    /// connection; it never returns to the pool.
    Streamed(ChunkedBodyReader<Connection>),
}

impl std::fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseBody::Empty => f.write_str("ResponseBody::Empty"),
            ResponseBody::Buffered(bytes) => f
                .debug_tuple("ResponseBody::Buffered")
                .field(&bytes.len())
                .finish(),
            ResponseBody::Streamed(_) => f.write_str("ResponseBody::Streamed(..)"),
        }
    }
}

/// One HTTP response.
#[derive(Debug)]
pub struct Response {
    pub status: u16,
    pub headers: Headers,
    /// Charset resolved from `Content-Type`; `None` for binary bodies.
    pub charset: Option<String>,
    pub body: ResponseBody,
}

impl Response {
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The entity tag, if the server sent one.
    #[must_use]
    pub fn etag(&self) -> Option<&str> {
        self.headers.get("etag")
    }

    /// The buffered body bytes. `None` for streamed bodies.
    #[must_use]
    pub fn bytes(&self) -> Option<&Bytes> {
        match &self.body {
            ResponseBody::Buffered(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// The body decoded per the resolved charset. `None` for streamed
    /// bodies; an empty string for empty ones. Bodies without a known
    /// charset decode as UTF-8.
    #[must_use]
    pub fn text(&self) -> Option<String> {
        match &self.body {
            ResponseBody::Empty => Some(String::new()),
            ResponseBody::Buffered(bytes) => Some(decode_text(bytes, self.charset.as_deref())),
            ResponseBody::Streamed(_) => None,
        }
    }

    /// Takes the live line reader out of a streamed response, leaving
    /// the body empty. `None` if the body was not streamed.
    pub fn take_reader(&mut self) -> Option<ChunkedBodyReader<Connection>> {
        match std::mem::replace(&mut self.body, ResponseBody::Empty) {
            ResponseBody::Streamed(reader) => Some(reader),
            other => {
                self.body = other;
                None
            }
        }
    }
}

fn decode_text(bytes: &[u8], charset: Option<&str>) -> String {
    match charset {
        Some("iso-8859-1" | "latin-1" | "latin1") => {
            // Latin-1 maps each byte to the code point of the same
            // value.
            bytes.iter().map(|&b| char::from(b)).collect()
        }
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// Resolves the charset for a `Content-Type`: an explicit `charset`
/// parameter wins, JSON defaults to UTF-8, other text defaults to
/// Latin-1 per HTTP/1.1, and anything else is treated as binary.
pub(crate) fn resolve_charset(content_type: Option<&str>) -> Option<String> {
    let content_type = content_type?.to_ascii_lowercase();
    let mut parts = content_type.split(';');
    let media_type = parts.next().unwrap_or_default().trim().to_string();
    for param in parts {
        if let Some((name, value)) = param.split_once('=') {
            if name.trim() == "charset" {
                return Some(value.trim().trim_matches('"').to_string());
            }
        }
    }
    if media_type == "application/json" || media_type.ends_with("+json") {
        return Some("utf-8".to_string());
    }
    if media_type.starts_with("text/") {
        return Some("iso-8859-1".to_string());
    }
    None
}
