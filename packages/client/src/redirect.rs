//! Permanent-redirect memoization
//!
//! A 301 means the resource moved for good, so the session remembers
//! the mapping and rewrites matching URLs before they ever reach the
//! wire. The table is append-only and read-mostly; entries live as
//! long as the session does, which is unbounded growth in principle
//! but a handful of URLs in practice for a single database host.

use dashmap::DashMap;
use tracing::debug;

/// URL → URL map populated only by 301 responses.
#[derive(Debug, Default)]
pub struct PermanentRedirectTable {
    map: DashMap<String, String>,
}

impl PermanentRedirectTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rewrites a URL through the table; unchanged when no 301 has
    /// been seen for it.
    #[must_use]
    pub fn resolve(&self, url: &str) -> String {
        match self.map.get(url) {
            Some(target) => target.clone(),
            None => url.to_string(),
        }
    }

    /// Records a permanent redirect.
    pub fn memoize(&self, from: &str, to: &str) {
        debug!(from, to, "memoizing permanent redirect");
        self.map.insert(from.to_string(), to.to_string());
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_passes_unknown_urls_through() {
        let table = PermanentRedirectTable::new();
        assert_eq!(table.resolve("http://db/a"), "http://db/a");
        table.memoize("http://db/a", "http://db2/a");
        assert_eq!(table.resolve("http://db/a"), "http://db2/a");
        assert_eq!(table.resolve("http://db/b"), "http://db/b");
    }
}
