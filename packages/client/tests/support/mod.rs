//! Minimal blocking mock server for transport tests.
//!
//! Each test spawns a `TcpListener` on an ephemeral port and drives
//! connections with these helpers. No HTTP library on the server side:
//! the point is to control every byte on the wire.

#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

/// One parsed request as the server saw it: head text plus body bytes.
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub head: String,
    pub body: Vec<u8>,
}

impl SeenRequest {
    /// The request line, e.g. `GET /db/doc1 HTTP/1.1`.
    pub fn request_line(&self) -> &str {
        self.head.lines().next().unwrap_or_default()
    }

    /// The value of a header, case-insensitive.
    pub fn header(&self, name: &str) -> Option<String> {
        self.head.lines().skip(1).find_map(|line| {
            let (n, v) = line.split_once(':')?;
            if n.trim().eq_ignore_ascii_case(name) {
                Some(v.trim().to_string())
            } else {
                None
            }
        })
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.header(name).is_some()
    }
}

/// Reads one request off the stream, honoring `Content-Length`.
/// `None` when the client closed the connection.
pub fn read_request(stream: &mut TcpStream) -> Option<SeenRequest> {
    let mut raw = Vec::new();
    let mut byte = [0u8; 1];
    while !raw.ends_with(b"\r\n\r\n") {
        match stream.read(&mut byte) {
            Ok(0) => return None,
            Ok(_) => raw.push(byte[0]),
            Err(_) => return None,
        }
    }
    let head = String::from_utf8_lossy(&raw[..raw.len() - 4]).to_string();

    let request = SeenRequest {
        head,
        body: Vec::new(),
    };
    let length: usize = request
        .header("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let mut body = vec![0u8; length];
    if length > 0 {
        stream.read_exact(&mut body).ok()?;
    }
    Some(SeenRequest { body, ..request })
}

/// Writes a response with a `Content-Length` body.
pub fn respond(stream: &mut TcpStream, status: &str, headers: &[(&str, &str)], body: &[u8]) {
    let mut out = format!("HTTP/1.1 {status}\r\n");
    for (name, value) in headers {
        out.push_str(&format!("{name}: {value}\r\n"));
    }
    out.push_str(&format!("Content-Length: {}\r\n\r\n", body.len()));
    let _ = stream.write_all(out.as_bytes());
    let _ = stream.write_all(body);
    let _ = stream.flush();
}

/// Writes a response head without any framing headers.
pub fn respond_head(stream: &mut TcpStream, status: &str, headers: &[(&str, &str)]) {
    let mut out = format!("HTTP/1.1 {status}\r\n");
    for (name, value) in headers {
        out.push_str(&format!("{name}: {value}\r\n"));
    }
    out.push_str("\r\n");
    let _ = stream.write_all(out.as_bytes());
    let _ = stream.flush();
}

/// Encodes chunked transfer-encoding frames plus the terminator.
pub fn chunked_body(chunks: &[&[u8]]) -> Vec<u8> {
    let mut wire = Vec::new();
    for chunk in chunks {
        wire.extend_from_slice(format!("{:x}\r\n", chunk.len()).as_bytes());
        wire.extend_from_slice(chunk);
        wire.extend_from_slice(b"\r\n");
    }
    wire.extend_from_slice(b"0\r\n\r\n");
    wire
}

/// A mock server running a handler on its own thread.
///
/// The handler gets each accepted connection in turn plus the shared
/// request log; it returns `false` to stop accepting.
pub struct MockServer {
    pub url: String,
    pub requests: Arc<Mutex<Vec<SeenRequest>>>,
    handle: Option<JoinHandle<()>>,
}

impl MockServer {
    pub fn start<F>(handler: F) -> Self
    where
        F: Fn(usize, TcpStream, &Arc<Mutex<Vec<SeenRequest>>>) -> bool + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock server");
        let url = format!("http://{}", listener.local_addr().expect("local addr"));
        let requests = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&requests);
        let handle = std::thread::spawn(move || {
            for (i, stream) in listener.incoming().enumerate() {
                let Ok(stream) = stream else { break };
                if !handler(i, stream, &log) {
                    break;
                }
            }
        });
        MockServer {
            url,
            requests,
            handle: Some(handle),
        }
    }

    /// Snapshot of every request the server has parsed so far.
    pub fn seen(&self) -> Vec<SeenRequest> {
        self.requests.lock().expect("request log lock").clone()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        // The accept loop ends when the listener's thread sees the
        // test connect-and-close below, or when the process exits.
        if let Some(handle) = self.handle.take() {
            drop(handle);
        }
    }
}

/// Serves a connection that answers every request with the same
/// canned response; used by tests that only care about the client
/// side.
pub fn echo_connection(
    mut stream: TcpStream,
    log: &Arc<Mutex<Vec<SeenRequest>>>,
    status: &str,
    headers: &[(&str, &str)],
    body: &[u8],
) {
    while let Some(request) = read_request(&mut stream) {
        log.lock().expect("request log lock").push(request);
        respond(&mut stream, status, headers, body);
    }
}
