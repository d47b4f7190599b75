//! Error taxonomy
//!
//! HTTP error statuses the caller routinely branches on get their own
//! variants; everything else in the 4xx/5xx band lands in [`Error::Server`].
//! Socket failures stay [`io::Error`]s underneath so the retry policy
//! can classify them by kind.

use std::io;

use thiserror::Error as ThisError;

/// A `Result` alias where the `Err` case is [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, ThisError)]
pub enum Error {
    /// 401: the request lacked valid credentials.
    #[error("unauthorized: {reason}")]
    Unauthorized { reason: String },

    /// 404: no such database, document or attachment.
    #[error("not found: {reason}")]
    NotFound { reason: String },

    /// 409: the write lost a revision race.
    #[error("conflict: {reason}")]
    Conflict { reason: String },

    /// 412: a precondition header was not met, e.g. creating a
    /// database that already exists.
    #[error("precondition failed: {reason}")]
    PreconditionFailed { reason: String },

    /// Any other 4xx/5xx, carrying the server's `error`/`reason` pair.
    #[error("server error {status}: {error} {reason}")]
    Server {
        status: u16,
        error: String,
        reason: String,
    },

    /// The redirect chain from `url` exceeded the configured hop limit.
    #[error("too many redirects from {url} (limit {limit})")]
    RedirectLimit { url: String, limit: usize },

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    /// A URL the transport cannot speak to: bad scheme, missing host.
    #[error("unsupported url: {0}")]
    UnsupportedUrl(String),

    /// The server broke HTTP/1.1 framing.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("tls error: {0}")]
    Tls(#[from] rustls::Error),
}

impl Error {
    /// Maps an error-band status and its decoded body to a variant.
    pub(crate) fn from_status(status: u16, error: String, reason: String) -> Self {
        match status {
            401 => Error::Unauthorized { reason },
            404 => Error::NotFound { reason },
            409 => Error::Conflict { reason },
            412 => Error::PreconditionFailed { reason },
            _ => Error::Server {
                status,
                error,
                reason,
            },
        }
    }

    /// The HTTP status behind this error, when there is one.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Unauthorized { .. } => Some(401),
            Error::NotFound { .. } => Some(404),
            Error::Conflict { .. } => Some(409),
            Error::PreconditionFailed { .. } => Some(412),
            Error::Server { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The server-supplied reason, when there is one.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Error::Unauthorized { reason }
            | Error::NotFound { reason }
            | Error::Conflict { reason }
            | Error::PreconditionFailed { reason }
            | Error::Server { reason, .. } => Some(reason),
            _ => None,
        }
    }
}
