//! Keep-alive connection pool
//!
//! One mutex guards the per-destination idle stacks. The lock is held
//! only for list manipulation; dialing and liveness probing happen
//! outside it, so slow connects never serialize unrelated requests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rustls::ClientConfig;
use tracing::{debug, trace};

use super::{Connection, PoolKey};
use crate::error::Result;

/// Thread-safe registry of idle keep-alive connections.
pub struct ConnectionPool {
    idle: Mutex<HashMap<PoolKey, Vec<Connection>>>,
    tls: Arc<ClientConfig>,
    timeout: Option<Duration>,
}

impl ConnectionPool {
    pub fn new(tls: Arc<ClientConfig>, timeout: Option<Duration>) -> Self {
        ConnectionPool {
            idle: Mutex::new(HashMap::new()),
            tls,
            timeout,
        }
    }

    /// Hands out a live connection for the destination, reusing the
    /// most recently released one when possible.
    ///
    /// Dead idle connections are discarded along the way. Connect
    /// errors propagate unmodified; retrying is the executor's
    /// responsibility, which may call `acquire` again after discarding
    /// a failed connection.
    pub fn acquire(&self, scheme: &str, host: &str, port: u16) -> Result<Connection> {
        let key = PoolKey::new(scheme, host, port);
        loop {
            let candidate = {
                let mut idle = self.idle.lock().unwrap_or_else(|e| e.into_inner());
                idle.get_mut(&key).and_then(Vec::pop)
            };
            match candidate {
                Some(mut conn) => {
                    if conn.is_alive() {
                        trace!(?key, "reusing pooled connection");
                        return Ok(conn);
                    }
                    debug!(?key, "discarding dead pooled connection");
                }
                None => break,
            }
        }
        Connection::dial(scheme, host, port, self.timeout, &self.tls)
    }

    /// Returns a connection to its idle stack for later reuse.
    pub fn release(&self, conn: Connection) {
        let key = conn.key().clone();
        trace!(?key, "releasing connection to pool");
        let mut idle = self.idle.lock().unwrap_or_else(|e| e.into_inner());
        idle.entry(key).or_default().push(conn);
    }

    /// Number of idle connections for a destination, for diagnostics.
    #[must_use]
    pub fn idle_count(&self, scheme: &str, host: &str, port: u16) -> usize {
        let key = PoolKey::new(scheme, host, port);
        let idle = self.idle.lock().unwrap_or_else(|e| e.into_inner());
        idle.get(&key).map_or(0, Vec::len)
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let idle = self.idle.lock().unwrap_or_else(|e| e.into_inner());
        let total: usize = idle.values().map(Vec::len).sum();
        f.debug_struct("ConnectionPool")
            .field("destinations", &idle.len())
            .field("idle", &total)
            .finish()
    }
}
