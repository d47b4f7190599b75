//! Blocking connections
//!
//! A [`Connection`] is one open socket to a database host, plain TCP
//! or rustls-wrapped, with a small read buffer for line-oriented
//! parsing. Connections are tagged with their `(scheme, host:port)`
//! pool key and move between the [`ConnectionPool`] and one in-flight
//! request at a time.

mod pool;

pub use pool::ConnectionPool;

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection, RootCertStore, StreamOwned};
use tracing::{debug, trace};

use crate::error::{Error, Result};

const READ_BUF_SIZE: usize = 8 * 1024;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(0);

/// Destination key a pooled connection is filed under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    pub scheme: String,
    pub hostport: String,
}

impl PoolKey {
    #[must_use]
    pub fn new(scheme: &str, host: &str, port: u16) -> Self {
        PoolKey {
            scheme: scheme.to_string(),
            hostport: format!("{host}:{port}"),
        }
    }
}

enum Stream {
    Plain(TcpStream),
    Tls(Box<StreamOwned<ClientConnection, TcpStream>>),
}

impl Stream {
    fn tcp(&self) -> &TcpStream {
        match self {
            Stream::Plain(s) => s,
            Stream::Tls(s) => s.get_ref(),
        }
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Stream::Plain(s) => s.read(buf),
            Stream::Tls(s) => s.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Stream::Plain(s) => s.write(buf),
            Stream::Tls(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Stream::Plain(s) => s.flush(),
            Stream::Tls(s) => s.flush(),
        }
    }
}

/// An open, connected socket with buffered reads.
pub struct Connection {
    stream: Stream,
    key: PoolKey,
    id: u64,
    buf: Vec<u8>,
    pos: usize,
}

impl Connection {
    /// Opens a connection to `host:port`, performing the TLS setup for
    /// `https`. The timeout applies to connect, reads and writes.
    pub fn dial(
        scheme: &str,
        host: &str,
        port: u16,
        timeout: Option<Duration>,
        tls: &Arc<ClientConfig>,
    ) -> Result<Self> {
        let tcp = connect_tcp(host, port, timeout)?;
        tcp.set_read_timeout(timeout)?;
        tcp.set_write_timeout(timeout)?;
        tcp.set_nodelay(true)?;
        debug!(scheme, host, port, "opened connection");

        let stream = match scheme {
            "http" => Stream::Plain(tcp),
            "https" => {
                let name = ServerName::try_from(host.to_string())
                    .map_err(|_| Error::UnsupportedUrl(format!("invalid server name {host:?}")))?;
                let tls_conn = ClientConnection::new(Arc::clone(tls), name)?;
                Stream::Tls(Box::new(StreamOwned::new(tls_conn, tcp)))
            }
            other => {
                return Err(Error::UnsupportedUrl(format!(
                    "unsupported scheme {other:?}"
                )));
            }
        };

        Ok(Connection {
            stream,
            key: PoolKey::new(scheme, host, port),
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            buf: Vec::new(),
            pos: 0,
        })
    }

    #[must_use]
    pub fn key(&self) -> &PoolKey {
        &self.key
    }

    /// Process-unique identifier, for tracing which socket served a
    /// request.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Peeks at the socket to judge whether an idle connection is
    /// still usable. Any readable state on an idle keep-alive socket
    /// means the server closed it or sent something unsolicited, so
    /// only "nothing to read yet" counts as alive.
    pub fn is_alive(&mut self) -> bool {
        if self.pos < self.buf.len() {
            // Unconsumed response bytes: the previous user did not
            // drain cleanly.
            return false;
        }
        let tcp = self.stream.tcp();
        if tcp.set_nonblocking(true).is_err() {
            return false;
        }
        let mut probe = [0u8; 1];
        let alive =
            matches!(tcp.peek(&mut probe), Err(ref e) if e.kind() == io::ErrorKind::WouldBlock);
        let restored = tcp.set_nonblocking(false).is_ok();
        alive && restored
    }

    /// Reads one line, returning it without its CR/LF terminator.
    /// A clean EOF before any byte yields an empty string.
    pub fn read_line(&mut self) -> io::Result<String> {
        let mut line = Vec::new();
        loop {
            if self.fill_buf()? == 0 {
                break;
            }
            if let Some(offset) = self.buf[self.pos..].iter().position(|&b| b == b'\n') {
                line.extend_from_slice(&self.buf[self.pos..self.pos + offset]);
                self.pos += offset + 1;
                break;
            }
            line.extend_from_slice(&self.buf[self.pos..]);
            self.pos = self.buf.len();
        }
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        String::from_utf8(line)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "non-utf8 header line"))
    }

    fn fill_buf(&mut self) -> io::Result<usize> {
        if self.pos < self.buf.len() {
            return Ok(self.buf.len() - self.pos);
        }
        self.buf.resize(READ_BUF_SIZE, 0);
        self.pos = 0;
        match self.stream.read(&mut self.buf) {
            Ok(n) => {
                self.buf.truncate(n);
                Ok(n)
            }
            Err(err) => {
                self.buf.clear();
                Err(err)
            }
        }
    }
}

impl Read for Connection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let available = self.fill_buf()?;
        if available == 0 {
            return Ok(0);
        }
        let n = available.min(buf.len());
        buf[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

impl Write for Connection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("key", &self.key)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

fn connect_tcp(host: &str, port: u16, timeout: Option<Duration>) -> io::Result<TcpStream> {
    match timeout {
        None => TcpStream::connect((host, port)),
        Some(timeout) => {
            let mut last_err = None;
            for addr in (host, port).to_socket_addrs()? {
                trace!(%addr, "connecting");
                match TcpStream::connect_timeout(&addr, timeout) {
                    Ok(stream) => return Ok(stream),
                    Err(err) => last_err = Some(err),
                }
            }
            Err(last_err.unwrap_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no address for {host}:{port}"),
                )
            }))
        }
    }
}

/// Builds the rustls client configuration shared by every connection
/// a session opens: the webpki bundle as a base plus platform roots.
pub(crate) fn build_tls_config() -> std::result::Result<Arc<ClientConfig>, rustls::Error> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    for cert in rustls_native_certs::load_native_certs().certs {
        // Unparseable platform certs are skipped, not fatal.
        let _ = roots.add(cert);
    }
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(Arc::new(config))
}
