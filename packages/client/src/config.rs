//! Session configuration
//!
//! [`SessionConfig`] gathers the knobs a long-running client cares
//! about: socket timeout, redirect hop limit, retry schedule and
//! cache bounds. [`RetryPolicy`] decides which socket failures are
//! transient and how many times to go back to the wire for them.

use std::collections::HashSet;
use std::io;
use std::time::Duration;

/// Which socket errors get retried, and how long to wait before each
/// retry. The number of delays bounds the number of retries.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// One entry per permitted retry, slept in order.
    pub delays: Vec<Duration>,
    /// The [`io::ErrorKind`]s considered transient.
    pub retryable: HashSet<io::ErrorKind>,
}

impl Default for RetryPolicy {
    /// One immediate retry of the usual transient kinds. Covers the
    /// common case of a keep-alive connection the server idled out
    /// between requests.
    fn default() -> Self {
        RetryPolicy {
            delays: vec![Duration::ZERO],
            retryable: default_retryable_errors(),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub fn no_retry() -> Self {
        RetryPolicy {
            delays: Vec::new(),
            retryable: default_retryable_errors(),
        }
    }

    /// Replaces the delay schedule.
    #[must_use]
    pub fn with_delays(mut self, delays: Vec<Duration>) -> Self {
        self.delays = delays;
        self
    }

    /// Whether this error is worth another trip to the wire.
    #[must_use]
    pub fn is_retryable(&self, err: &io::Error) -> bool {
        self.retryable.contains(&err.kind())
    }
}

/// The error kinds a flaky network or a bounced server produces.
fn default_retryable_errors() -> HashSet<io::ErrorKind> {
    use io::ErrorKind::{
        BrokenPipe, ConnectionAborted, ConnectionRefused, ConnectionReset, HostUnreachable,
        NetworkUnreachable, TimedOut,
    };
    [
        ConnectionReset,
        ConnectionRefused,
        ConnectionAborted,
        TimedOut,
        BrokenPipe,
        HostUnreachable,
        NetworkUnreachable,
    ]
    .into_iter()
    .collect()
}

/// Configuration for a [`Session`](crate::Session).
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Socket timeout applied to connect, read and write. `None`
    /// blocks indefinitely, which continuous feeds rely on.
    pub timeout: Option<Duration>,
    /// Maximum redirect hops followed for one request.
    pub max_redirects: usize,
    pub retry: RetryPolicy,
    /// Cache byte total that triggers eviction.
    pub cache_max_bytes: u64,
    /// Byte total eviction shrinks the cache down to.
    pub cache_retain_bytes: u64,
    pub user_agent: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            timeout: None,
            max_redirects: 5,
            retry: RetryPolicy::default(),
            cache_max_bytes: 10 << 20,
            cache_retain_bytes: 8 << 20,
            user_agent: concat!("sofa/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the cache bounds. The retain threshold is clamped to the
    /// maximum.
    #[must_use]
    pub fn with_cache_bytes(mut self, max: u64, retain: u64) -> Self {
        self.cache_max_bytes = max;
        self.cache_retain_bytes = retain.min(max);
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}
