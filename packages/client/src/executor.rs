//! Single-request execution
//!
//! [`RequestExecutor`] owns one trip across the wire: acquire a
//! connection, write the request (chunked framing when asked), retry
//! transient socket failures per the session's schedule, read the
//! response head and classify it. The session layer above decides what
//! a redirect or a cache revalidation means; this layer only reports
//! them.

use std::io::{Read, Write};
use std::thread;

use bytes::Bytes;
use tracing::{debug, trace, warn};
use url::Url;

use crate::chunked::ChunkedBodyReader;
use crate::config::RetryPolicy;
use crate::connect::{Connection, ConnectionPool};
use crate::error::{Error, Result};
use crate::headers::Headers;
use crate::request::Method;
use crate::response::{Response, ResponseBody, resolve_charset};

/// A request after default headers, auth and body framing have been
/// applied. The header set is frozen from here on.
pub(crate) struct PreparedRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Headers,
    pub payload: Payload,
}

/// Wire form of the request body.
pub(crate) enum Payload {
    None,
    /// Sent in one write, announced by `Content-Length`.
    Full(Bytes),
    /// Pre-framed chunk payloads, one per non-blank body line, sent as
    /// chunked transfer-encoding. Framed up front so a retry resends
    /// identical bytes.
    Chunked(Vec<Bytes>),
}

/// What one executed request amounted to.
pub(crate) enum Outcome {
    Success(Response),
    /// 304 against the conditional GET: the caller's cached response
    /// is still valid.
    CachedValid,
    Redirect { location: String, status: u16 },
}

pub(crate) struct RequestExecutor<'a> {
    pool: &'a ConnectionPool,
    retry: &'a RetryPolicy,
}

impl<'a> RequestExecutor<'a> {
    pub fn new(pool: &'a ConnectionPool, retry: &'a RetryPolicy) -> Self {
        RequestExecutor { pool, retry }
    }

    /// Sends the request and classifies the reply.
    ///
    /// `conditional` marks that an `If-None-Match` rode along, making a
    /// 304 answer a cache revalidation. `stream_body` opts into
    /// handing back a live [`ChunkedBodyReader`] instead of buffering.
    pub fn execute(
        &self,
        request: &PreparedRequest,
        conditional: bool,
        stream_body: bool,
    ) -> Result<Outcome> {
        let scheme = request.url.scheme();
        let host = request
            .url
            .host_str()
            .ok_or_else(|| Error::UnsupportedUrl(format!("url without host: {}", request.url)))?;
        let port = request
            .url
            .port_or_known_default()
            .ok_or_else(|| Error::UnsupportedUrl(format!("url without port: {}", request.url)))?;

        // Explicit finite loop over the delay schedule: each delay buys
        // one retry after a transient socket failure, then the original
        // error surfaces.
        let mut delays = self.retry.delays.iter();
        let (conn, status, headers) = loop {
            match self.attempt(scheme, host, port, request) {
                Ok(head) => break head,
                Err(Error::Io(err)) if self.retry.is_retryable(&err) => match delays.next() {
                    Some(delay) => {
                        warn!(%err, ?delay, "transient socket error, retrying");
                        if !delay.is_zero() {
                            thread::sleep(*delay);
                        }
                    }
                    None => return Err(Error::Io(err)),
                },
                Err(err) => return Err(err),
            }
        };

        self.classify(conn, request, status, headers, conditional, stream_body)
    }

    /// One attempt: acquire, send, read the response head. The dead
    /// connection is dropped on failure; the next attempt dials fresh.
    fn attempt(
        &self,
        scheme: &str,
        host: &str,
        port: u16,
        request: &PreparedRequest,
    ) -> Result<(Connection, u16, Headers)> {
        let mut conn = self.pool.acquire(scheme, host, port)?;
        match send_request(&mut conn, request).and_then(|()| read_head(&mut conn)) {
            Ok((status, headers)) => Ok((conn, status, headers)),
            Err(err) => Err(err),
        }
    }

    /// Applies the status-code policy table to the response head.
    #[allow(clippy::too_many_lines)]
    fn classify(
        &self,
        mut conn: Connection,
        request: &PreparedRequest,
        status: u16,
        headers: Headers,
        conditional: bool,
        stream_body: bool,
    ) -> Result<Outcome> {
        let method = request.method;
        let chunked = headers
            .get_or("transfer-encoding", "")
            .eq_ignore_ascii_case("chunked");
        let content_length = headers
            .get("content-length")
            .and_then(|v| v.trim().parse::<u64>().ok());
        let keep_alive = !headers
            .get_or("connection", "")
            .eq_ignore_ascii_case("close");

        // Error band: read and close the body, surface the typed error.
        if status >= 400 {
            let (body, reusable) = read_full_body(&mut conn, method, status, &headers)?;
            self.finish(conn, keep_alive && reusable);
            let (error, reason) = decode_error_body(headers.get("content-type"), &body);
            debug!(status, %error, %reason, "request failed");
            return Err(Error::from_status(status, error, reason));
        }

        // Redirects: 303 always; 301/302/307 only for safe methods.
        if status == 303 || (matches!(status, 301 | 302 | 307) && method.is_safe()) {
            let (_, reusable) = read_full_body(&mut conn, method, status, &headers)?;
            self.finish(conn, keep_alive && reusable);
            let location = headers
                .get("location")
                .ok_or_else(|| Error::Protocol(format!("{status} response without Location")))?
                .to_string();
            return Ok(Outcome::Redirect { location, status });
        }

        // Revalidation of the conditional GET.
        if status == 304
            && conditional
            && method.is_safe()
            && !headers
                .get_or("cache-control", "")
                .to_ascii_lowercase()
                .contains("must-revalidate")
        {
            let (_, reusable) = read_full_body(&mut conn, method, status, &headers)?;
            self.finish(conn, keep_alive && reusable);
            trace!(url = %request.url, "304, serving cached response");
            return Ok(Outcome::CachedValid);
        }

        // Success handling.
        let charset = resolve_charset(headers.get("content-type"));

        if method == Method::Head || matches!(status, 204 | 304) || content_length == Some(0) {
            self.finish(conn, keep_alive);
            return Ok(Outcome::Success(Response {
                status,
                headers,
                charset,
                body: ResponseBody::Empty,
            }));
        }

        if chunked && stream_body {
            // The reader owns the connection; it never rejoins the pool.
            trace!(url = %request.url, "handing back streamed chunked body");
            return Ok(Outcome::Success(Response {
                status,
                headers,
                charset,
                body: ResponseBody::Streamed(ChunkedBodyReader::new(conn)),
            }));
        }

        let (body, reusable) = read_full_body(&mut conn, method, status, &headers)?;
        self.finish(conn, keep_alive && reusable);
        let body = if body.is_empty() {
            ResponseBody::Empty
        } else {
            ResponseBody::Buffered(body)
        };
        Ok(Outcome::Success(Response {
            status,
            headers,
            charset,
            body,
        }))
    }

    /// Returns the connection to the pool, or drops it when the server
    /// asked to close or the body framing exhausted the stream.
    fn finish(&self, conn: Connection, reusable: bool) {
        if reusable {
            self.pool.release(conn);
        } else {
            trace!("closing non-reusable connection");
            drop(conn);
        }
    }
}

/// Writes the request line, headers and body to the wire.
fn send_request(conn: &mut Connection, request: &PreparedRequest) -> Result<()> {
    let mut head = String::new();
    let path = request.url.path();
    match request.url.query() {
        Some(query) => {
            head.push_str(&format!("{} {path}?{query} HTTP/1.1\r\n", request.method));
        }
        None => head.push_str(&format!("{} {path} HTTP/1.1\r\n", request.method)),
    }
    if !request.headers.contains("host") {
        head.push_str(&format!("Host: {}\r\n", host_header(&request.url)));
    }
    for (name, value) in request.headers.iter() {
        head.push_str(&format!("{name}: {value}\r\n"));
    }
    head.push_str("\r\n");
    conn.write_all(head.as_bytes())?;

    match &request.payload {
        Payload::None => {}
        Payload::Full(body) => conn.write_all(body)?,
        Payload::Chunked(frames) => {
            for frame in frames {
                conn.write_all(format!("{:x}\r\n", frame.len()).as_bytes())?;
                conn.write_all(frame)?;
                conn.write_all(b"\r\n")?;
            }
            conn.write_all(b"0\r\n\r\n")?;
        }
    }
    conn.flush()?;
    Ok(())
}

/// The `Host` header value: port elided when it is the scheme default.
fn host_header(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

/// Reads and parses the status line and header block.
fn read_head(conn: &mut Connection) -> Result<(u16, Headers)> {
    let status_line = conn.read_line()?;
    if status_line.is_empty() {
        // The server hung up before sending a single byte, usually a
        // keep-alive connection racing its idle close. Normalized to
        // the reset class so it flows through the retry policy.
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "connection closed before status line",
        )));
    }
    let status = parse_status_line(&status_line)?;

    let mut headers = Headers::new();
    loop {
        let line = conn.read_line()?;
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| Error::Protocol(format!("malformed header line {line:?}")))?;
        headers.set(name.trim(), value.trim());
    }
    Ok((status, headers))
}

fn parse_status_line(line: &str) -> Result<u16> {
    let mut parts = line.split_whitespace();
    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/1.") {
        return Err(Error::Protocol(format!("bad status line {line:?}")));
    }
    parts
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| Error::Protocol(format!("bad status line {line:?}")))
}

/// Reads the entire body per its framing. The boolean is whether the
/// connection survives: an EOF-delimited body consumes it.
fn read_full_body(
    conn: &mut Connection,
    method: Method,
    status: u16,
    headers: &Headers,
) -> Result<(Bytes, bool)> {
    if method == Method::Head || matches!(status, 204 | 304) {
        return Ok((Bytes::new(), true));
    }
    if headers
        .get_or("transfer-encoding", "")
        .eq_ignore_ascii_case("chunked")
    {
        let mut reader = ChunkedBodyReader::new(&mut *conn);
        let mut body = Vec::new();
        reader.read_to_end(&mut body)?;
        return Ok((Bytes::from(body), true));
    }
    if let Some(length) = headers
        .get("content-length")
        .and_then(|v| v.trim().parse::<usize>().ok())
    {
        let mut body = vec![0u8; length];
        conn.read_exact(&mut body)?;
        return Ok((Bytes::from(body), true));
    }
    // No framing: the body runs to connection close.
    let mut body = Vec::new();
    conn.read_to_end(&mut body)?;
    Ok((Bytes::from(body), false))
}

/// Pulls `error`/`reason` out of a JSON error body, degrading to the
/// raw text when the body is not JSON or does not parse.
fn decode_error_body(content_type: Option<&str>, body: &[u8]) -> (String, String) {
    let text = String::from_utf8_lossy(body).trim().to_string();
    if content_type.is_some_and(|ct| ct.contains("application/json")) {
        if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
            let field = |name: &str| {
                value
                    .get(name)
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string()
            };
            return (field("error"), field("reason"));
        }
    }
    (String::new(), text)
}
