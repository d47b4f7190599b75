//! Chunked transfer-encoding decoder
//!
//! [`ChunkedBodyReader`] wraps a transport and exposes the de-chunked
//! payload two ways: as a plain [`Read`] for buffering, and as a line
//! iterator for continuous feeds, where the server interleaves
//! newline heartbeats with JSON rows to keep the connection warm.
//! Heartbeat lines (all whitespace) are dropped by the line API and
//! passed through untouched by the byte API.

use std::io::{self, Read};

/// Reads a chunked response body from an underlying transport.
pub struct ChunkedBodyReader<R: Read> {
    transport: R,
    /// Bytes buffered for the line API but not yet handed out.
    pending: Vec<u8>,
    /// Payload bytes left in the current chunk.
    remaining: usize,
    closed: bool,
}

impl<R: Read> ChunkedBodyReader<R> {
    pub fn new(transport: R) -> Self {
        ChunkedBodyReader {
            transport,
            pending: Vec::new(),
            remaining: 0,
            closed: false,
        }
    }

    /// Whether the terminating zero-length chunk has been consumed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Releases the underlying transport.
    pub fn into_inner(self) -> R {
        self.transport
    }

    /// The next non-heartbeat line of the de-chunked payload, keeping
    /// its terminator. `None` once the body is exhausted. A final line
    /// without a terminator is still yielded.
    pub fn next_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        loop {
            if let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
                let rest = self.pending.split_off(pos + 1);
                let line = std::mem::replace(&mut self.pending, rest);
                if is_heartbeat(&line) {
                    continue;
                }
                return Ok(Some(line));
            }
            let mut buf = [0u8; 4096];
            let n = self.fill(&mut buf)?;
            if n == 0 {
                if self.pending.is_empty() || is_heartbeat(&self.pending) {
                    self.pending.clear();
                    return Ok(None);
                }
                return Ok(Some(std::mem::take(&mut self.pending)));
            }
            self.pending.extend_from_slice(&buf[..n]);
        }
    }

    /// Copies de-chunked payload bytes into `buf`, crossing chunk
    /// boundaries as needed. `Ok(0)` only at the end of the body.
    fn fill(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || self.closed {
            return Ok(0);
        }
        if self.remaining == 0 {
            self.remaining = self.read_chunk_size()?;
            if self.remaining == 0 {
                self.read_trailer()?;
                self.closed = true;
                return Ok(0);
            }
        }
        let n = self.remaining.min(buf.len());
        let read = self.transport.read(&mut buf[..n])?;
        if read == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed mid-chunk",
            ));
        }
        self.remaining -= read;
        if self.remaining == 0 {
            // The CRLF that closes every chunk's payload.
            self.read_line_raw()?;
        }
        Ok(read)
    }

    /// Parses the next chunk-size line. Extensions after `;` are
    /// tolerated and ignored.
    fn read_chunk_size(&mut self) -> io::Result<usize> {
        let line = self.read_line_raw()?;
        let size = line.split(';').next().unwrap_or_default().trim();
        usize::from_str_radix(size, 16).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("bad chunk size line {line:?}"),
            )
        })
    }

    /// Consumes trailer lines after the zero chunk, up to and
    /// including the blank line that ends the message.
    fn read_trailer(&mut self) -> io::Result<()> {
        loop {
            if self.read_line_raw()?.is_empty() {
                return Ok(());
            }
        }
    }

    /// Reads one CRLF-terminated line off the raw transport, returned
    /// without its terminator.
    fn read_line_raw(&mut self) -> io::Result<String> {
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            if self.transport.read(&mut byte)? == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed inside chunk framing",
                ));
            }
            if byte[0] == b'\n' {
                break;
            }
            line.push(byte[0]);
        }
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        String::from_utf8(line)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "non-utf8 chunk framing"))
    }
}

impl<R: Read> Read for ChunkedBodyReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        // Bytes the line API buffered come first.
        if !self.pending.is_empty() {
            let n = self.pending.len().min(buf.len());
            buf[..n].copy_from_slice(&self.pending[..n]);
            self.pending.drain(..n);
            return Ok(n);
        }
        self.fill(buf)
    }
}

impl<R: Read> Iterator for ChunkedBodyReader<R> {
    type Item = io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_line().transpose()
    }
}

impl<R: Read> std::fmt::Debug for ChunkedBodyReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkedBodyReader")
            .field("remaining", &self.remaining)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

fn is_heartbeat(line: &[u8]) -> bool {
    line.iter().all(u8::is_ascii_whitespace)
}
