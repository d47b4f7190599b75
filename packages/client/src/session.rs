//! Session: the public entry point
//!
//! A [`Session`] is long-lived and process-wide: it owns the
//! connection pool, the response cache, the permanent-redirect table
//! and the retry policy, and exposes one operation,
//! [`request`](Session::request). Any number of threads may call it
//! concurrently; all shared state lives behind the pool's and cache's
//! own locks.

use std::io::Read;

use bytes::Bytes;
use tracing::debug;
use url::Url;

use crate::cache::{CacheEntry, ResponseCache};
use crate::config::SessionConfig;
use crate::connect::{ConnectionPool, build_tls_config};
use crate::error::{Error, Result};
use crate::executor::{Outcome, Payload, PreparedRequest, RequestExecutor};
use crate::headers::Headers;
use crate::redirect::PermanentRedirectTable;
use crate::request::{Body, Credentials, Method, RequestOptions};
use crate::response::Response;

/// A long-lived HTTP session against one or more document databases.
pub struct Session {
    config: SessionConfig,
    pool: ConnectionPool,
    cache: ResponseCache,
    redirects: PermanentRedirectTable,
}

impl Session {
    /// Creates a session with default configuration.
    pub fn new() -> Result<Self> {
        Self::with_config(SessionConfig::default())
    }

    /// Creates a session with explicit configuration. Building the
    /// shared TLS configuration is the only fallible step.
    pub fn with_config(config: SessionConfig) -> Result<Self> {
        let tls = build_tls_config()?;
        Ok(Session {
            pool: ConnectionPool::new(tls, config.timeout),
            cache: ResponseCache::new(config.cache_max_bytes, config.cache_retain_bytes),
            redirects: PermanentRedirectTable::new(),
            config,
        })
    }

    /// Issues one request and returns the normalized response.
    ///
    /// Redirects are followed up to the configured maximum, transient
    /// socket errors are retried per the session's schedule, and
    /// cacheable GET responses feed the ETag cache. HTTP error
    /// statuses surface as typed [`Error`] values, never retried.
    pub fn request(
        &self,
        method: Method,
        url: &str,
        body: Body,
        headers: Headers,
        credentials: Option<&Credentials>,
    ) -> Result<Response> {
        self.request_with_options(method, url, body, headers, credentials, RequestOptions::default())
    }

    /// Like [`request`](Self::request), with per-request toggles such
    /// as streaming chunked response bodies.
    pub fn request_with_options(
        &self,
        method: Method,
        url: &str,
        body: Body,
        headers: Headers,
        credentials: Option<&Credentials>,
        options: RequestOptions,
    ) -> Result<Response> {
        self.request_inner(method, url, body, headers, credentials, options, 0)
    }

    /// The response cache, exposed for diagnostics.
    #[must_use]
    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// The permanent-redirect table, exposed for diagnostics.
    #[must_use]
    pub fn redirects(&self) -> &PermanentRedirectTable {
        &self.redirects
    }

    /// The connection pool, exposed for diagnostics.
    #[must_use]
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    fn request_inner(
        &self,
        method: Method,
        url: &str,
        body: Body,
        headers: Headers,
        credentials: Option<&Credentials>,
        options: RequestOptions,
        redirect_count: usize,
    ) -> Result<Response> {
        // Short-circuit URLs a 301 already moved.
        let resolved = self.redirects.resolve(url);
        let parsed = Url::parse(&resolved)?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::UnsupportedUrl(format!(
                "unsupported scheme in {resolved}"
            )));
        }

        let cached = self.cache.lookup(method, &resolved);
        let caller_headers = headers.clone();
        let prepared = self.prepare(method, parsed, body, headers, credentials, cached.as_ref())?;

        let executor = RequestExecutor::new(&self.pool, &self.config.retry);
        let outcome = executor.execute(&prepared, cached.is_some(), options.stream)?;

        match outcome {
            Outcome::CachedValid => {
                // The entry was cloned at lookup time, so a concurrent
                // eviction cannot take it away mid-request.
                let entry = cached
                    .ok_or_else(|| Error::Protocol("304 revalidation without cache entry".into()))?;
                Ok(entry.to_response())
            }

            Outcome::Redirect { location, status } => {
                if redirect_count >= self.config.max_redirects {
                    return Err(Error::RedirectLimit {
                        url: resolved,
                        limit: self.config.max_redirects,
                    });
                }
                // Location may be relative; resolve against the hop we
                // just made.
                let target = prepared.url.join(&location)?.to_string();
                if status == 301 {
                    self.redirects.memoize(&resolved, &target);
                }
                debug!(status, from = %resolved, to = %target, "following redirect");
                let (method, body) = if status == 303 {
                    // 303 demotes whatever we sent to a bodyless GET.
                    (Method::Get, Body::None)
                } else {
                    (method, replay_body(prepared.payload))
                };
                self.request_inner(
                    method,
                    &target,
                    body,
                    caller_headers,
                    credentials,
                    options,
                    redirect_count + 1,
                )
            }

            Outcome::Success(response) => {
                if cached.is_some() && response.status != 304 {
                    // The server answered a cached URL with fresh
                    // content: the old entry is stale.
                    self.cache.remove(&resolved);
                }
                if ResponseCache::is_cacheable(method, &response) {
                    self.cache.insert(&resolved, &response);
                }
                Ok(response)
            }
        }
    }

    /// Applies default headers, auth and the conditional-GET
    /// precondition, and frames the body for the wire. Caller-supplied
    /// headers always win over defaults.
    fn prepare(
        &self,
        method: Method,
        url: Url,
        body: Body,
        mut headers: Headers,
        credentials: Option<&Credentials>,
        cached: Option<&CacheEntry>,
    ) -> Result<PreparedRequest> {
        headers.set_default("Accept", "application/json");
        headers.set_default("Accept-Encoding", "utf-8");
        headers.set_default("User-Agent", self.config.user_agent.clone());
        if let Some(credentials) = credentials {
            headers.set_default("Authorization", credentials.basic_auth());
        }
        if let Some(etag) = cached.and_then(CacheEntry::etag) {
            headers.set_default("If-None-Match", etag);
        }

        let chunked = headers
            .get_or("transfer-encoding", "")
            .eq_ignore_ascii_case("chunked");

        let payload = match body {
            Body::None => {
                if chunked {
                    Payload::Chunked(Vec::new())
                } else {
                    headers.set_default("Content-Length", "0");
                    Payload::None
                }
            }
            Body::Bytes(bytes) => {
                if chunked {
                    Payload::Chunked(frame_lines(&bytes))
                } else {
                    headers.set_default("Content-Length", bytes.len().to_string());
                    Payload::Full(bytes)
                }
            }
            Body::Lines(mut reader) => {
                if chunked {
                    Payload::Chunked(frame_line_reader(&mut reader)?)
                } else {
                    // A streaming source without chunked encoding is
                    // read fully up front so its length is known.
                    let mut buffered = Vec::new();
                    reader.read_to_end(&mut buffered)?;
                    headers.set("Content-Length", buffered.len().to_string());
                    Payload::Full(Bytes::from(buffered))
                }
            }
        };

        Ok(PreparedRequest {
            method,
            url,
            headers,
            payload,
        })
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .field("redirects", &self.redirects.len())
            .finish_non_exhaustive()
    }
}

/// Rebuilds a request body from an already-framed payload so a
/// redirect hop can resend it.
fn replay_body(payload: Payload) -> Body {
    match payload {
        Payload::None => Body::None,
        Payload::Full(bytes) => Body::Bytes(bytes),
        // Frames concatenate back into the line stream they came from;
        // re-framing on the next hop reproduces them.
        Payload::Chunked(frames) => {
            let mut joined = Vec::new();
            for frame in frames {
                joined.extend_from_slice(&frame);
            }
            Body::Bytes(Bytes::from(joined))
        }
    }
}

/// Splits a buffered body into chunk frames: one per line, blank and
/// whitespace-only lines dropped, each remaining line CRLF-terminated.
fn frame_lines(bytes: &[u8]) -> Vec<Bytes> {
    let mut frames = Vec::new();
    for line in bytes.split(|&b| b == b'\n') {
        if let Some(frame) = frame_line(line) {
            frames.push(frame);
        }
    }
    frames
}

/// Drains a line source into chunk frames with the same rules as
/// [`frame_lines`].
fn frame_line_reader(reader: &mut (dyn std::io::BufRead + Send)) -> Result<Vec<Bytes>> {
    let mut frames = Vec::new();
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        if let Some(frame) = frame_line(&line) {
            frames.push(frame);
        }
    }
    Ok(frames)
}

fn frame_line(line: &[u8]) -> Option<Bytes> {
    let mut end = line.len();
    while end > 0 && (line[end - 1] == b'\n' || line[end - 1] == b'\r') {
        end -= 1;
    }
    let content = &line[..end];
    if content.iter().all(u8::is_ascii_whitespace) {
        return None;
    }
    let mut frame = Vec::with_capacity(content.len() + 2);
    frame.extend_from_slice(content);
    frame.extend_from_slice(b"\r\n");
    Some(Bytes::from(frame))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framing_drops_blank_lines_and_terminates_with_crlf() {
        let frames = frame_lines(b"{\"a\":1}\n\n   \n{\"b\":2}\r\n");
        assert_eq!(frames.len(), 2);
        assert_eq!(&frames[0][..], b"{\"a\":1}\r\n");
        assert_eq!(&frames[1][..], b"{\"b\":2}\r\n");
    }

    #[test]
    fn replayed_chunked_body_reframes_identically() {
        let frames = frame_lines(b"row1\nrow2\n");
        let body = replay_body(Payload::Chunked(frames.clone()));
        let Body::Bytes(bytes) = body else {
            panic!("expected buffered body");
        };
        assert_eq!(frame_lines(&bytes), frames);
    }
}
