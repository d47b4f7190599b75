//! Request-side types: methods, bodies, credentials and per-request
//! options.

use std::fmt;
use std::io::BufRead;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;

/// The verbs the transport speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
    Put,
    Post,
    Delete,
}

impl Method {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Put => "PUT",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        }
    }

    /// Safe methods have no side effects on the server; only these are
    /// auto-redirected on 301/302/307 and served from the cache.
    #[must_use]
    pub fn is_safe(self) -> bool {
        matches!(self, Method::Get | Method::Head)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request body.
///
/// `Lines` is for bulk feeds: a line-oriented source sent as one
/// chunk per line when the caller sets `Transfer-Encoding: chunked`,
/// or buffered whole otherwise.
pub enum Body {
    None,
    Bytes(Bytes),
    Lines(Box<dyn BufRead + Send>),
}

impl From<&str> for Body {
    fn from(s: &str) -> Self {
        Body::Bytes(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Body::Bytes(Bytes::from(s))
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Body::Bytes(Bytes::from(bytes))
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Body::Bytes(bytes)
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::None => f.write_str("Body::None"),
            Body::Bytes(bytes) => f.debug_tuple("Body::Bytes").field(&bytes.len()).finish(),
            Body::Lines(_) => f.write_str("Body::Lines(..)"),
        }
    }
}

/// Basic-auth credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials {
            username: username.into(),
            password: password.into(),
        }
    }

    /// The `Authorization` header value for these credentials.
    #[must_use]
    pub fn basic_auth(&self) -> String {
        let raw = format!("{}:{}", self.username, self.password);
        format!("Basic {}", BASE64.encode(raw))
    }
}

/// Per-request toggles.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestOptions {
    /// Hand a chunked response body back as a live line stream instead
    /// of buffering it.
    pub stream: bool,
}

impl RequestOptions {
    /// Options with streaming enabled.
    #[must_use]
    pub fn streamed() -> Self {
        RequestOptions { stream: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_auth_matches_the_rfc_vector() {
        // RFC 7617's Aladdin example.
        let credentials = Credentials::new("Aladdin", "open sesame");
        assert_eq!(credentials.basic_auth(), "Basic QWxhZGRpbjpvcGVuIHNlc2FtZQ==");
    }

    #[test]
    fn only_get_and_head_are_safe() {
        assert!(Method::Get.is_safe());
        assert!(Method::Head.is_safe());
        assert!(!Method::Put.is_safe());
        assert!(!Method::Post.is_safe());
        assert!(!Method::Delete.is_safe());
        assert_eq!(Method::Delete.to_string(), "DELETE");
    }
}
