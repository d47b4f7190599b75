//! ETag-aware response cache
//!
//! GET responses that carry an `ETag` and are not marked `no-cache`
//! are kept so the next request for the same URL can go out as a
//! conditional GET and come back as a bodyless 304. The cache is
//! byte-size-bounded: once the running total passes the configured
//! maximum, entries are evicted oldest-`Date`-header-first until the
//! total is back at the retain threshold.
//!
//! One mutex guards the map and the byte total together, keeping the
//! `sum(entry.size) == total` invariant airtight under concurrent
//! GETs. (The pool has its own, unrelated lock.)

mod entry;
mod http_date;

pub use entry::CacheEntry;
pub use http_date::parse_http_date;

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tracing::{debug, trace};

use crate::request::Method;
use crate::response::Response;

struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    total_bytes: u64,
}

/// Size-bounded URL → response store.
pub struct ResponseCache {
    inner: Mutex<CacheInner>,
    max_bytes: u64,
    retain_bytes: u64,
}

impl ResponseCache {
    #[must_use]
    pub fn new(max_bytes: u64, retain_bytes: u64) -> Self {
        ResponseCache {
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                total_bytes: 0,
            }),
            max_bytes,
            retain_bytes: retain_bytes.min(max_bytes),
        }
    }

    /// Looks up the cached response for a URL. Only GET and HEAD
    /// consult the cache.
    #[must_use]
    pub fn lookup(&self, method: Method, url: &str) -> Option<CacheEntry> {
        if !method.is_safe() {
            return None;
        }
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let entry = inner.entries.get(url).cloned();
        if entry.is_some() {
            trace!(url, "cache hit");
        }
        entry
    }

    /// Whether this response is worth keeping: a GET success carrying
    /// an `ETag` and a `Cache-Control` other than `no-cache`. Streamed
    /// bodies never qualify (their length is unknown and their
    /// connection is live).
    #[must_use]
    pub fn is_cacheable(method: Method, response: &Response) -> bool {
        method == Method::Get
            && response.etag().is_some()
            && !response
                .headers
                .get_or("cache-control", "")
                .to_ascii_lowercase()
                .contains("no-cache")
    }

    /// Inserts or replaces the entry for a URL, then evicts down to
    /// the retain threshold if the byte total passed the maximum.
    pub fn insert(&self, url: &str, response: &Response) {
        let Some(entry) = CacheEntry::from_response(response) else {
            return;
        };
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(old) = inner.entries.remove(url) {
            inner.total_bytes -= old.size;
        }
        inner.total_bytes += entry.size;
        trace!(url, size = entry.size, total = inner.total_bytes, "cache insert");
        inner.entries.insert(url.to_string(), entry);
        if inner.total_bytes > self.max_bytes {
            self.evict(&mut inner);
        }
    }

    /// Drops the entry for a URL, typically because the server
    /// answered it with something other than a 304.
    pub fn remove(&self, url: &str) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(old) = inner.entries.remove(url) {
            inner.total_bytes -= old.size;
            debug!(url, "evicted stale cache entry");
        }
    }

    /// Current byte total, for diagnostics and tests.
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.total_bytes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evicts oldest-`Date`-first until the total is at or below the
    /// retain threshold. Entries without a parseable `Date` sort
    /// oldest and go first.
    fn evict(&self, inner: &mut CacheInner) {
        let mut by_age: Vec<(String, Option<DateTime<Utc>>)> = inner
            .entries
            .iter()
            .map(|(url, entry)| (url.clone(), entry.date()))
            .collect();
        by_age.sort_by_key(|(_, date)| *date);

        for (url, _) in by_age {
            if inner.total_bytes <= self.retain_bytes {
                break;
            }
            if let Some(old) = inner.entries.remove(&url) {
                inner.total_bytes -= old.size;
                debug!(url, size = old.size, "cache eviction");
            }
        }
    }
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        f.debug_struct("ResponseCache")
            .field("entries", &inner.entries.len())
            .field("total_bytes", &inner.total_bytes)
            .field("max_bytes", &self.max_bytes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::Headers;
    use crate::response::ResponseBody;
    use bytes::Bytes;

    fn cached_response(etag: &str, date: &str, size: usize) -> Response {
        let mut headers = Headers::new();
        headers.set("ETag", format!("\"{etag}\""));
        headers.set("Date", date);
        Response {
            status: 200,
            headers,
            charset: Some("utf-8".to_string()),
            body: ResponseBody::Buffered(Bytes::from(vec![b'x'; size])),
        }
    }

    #[test]
    fn byte_total_tracks_inserts_and_replacements() {
        let cache = ResponseCache::new(1000, 800);
        cache.insert("http://db/a", &cached_response("1", "Mon, 01 Jan 2024 00:00:00 GMT", 100));
        cache.insert("http://db/b", &cached_response("2", "Tue, 02 Jan 2024 00:00:00 GMT", 200));
        assert_eq!(cache.total_bytes(), 300);
        // Replacement swaps the old size out of the total.
        cache.insert("http://db/a", &cached_response("3", "Wed, 03 Jan 2024 00:00:00 GMT", 50));
        assert_eq!(cache.total_bytes(), 250);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn eviction_is_oldest_date_first_down_to_retain() {
        let cache = ResponseCache::new(500, 300);
        cache.insert("http://db/old", &cached_response("1", "Mon, 01 Jan 2024 00:00:00 GMT", 200));
        cache.insert("http://db/mid", &cached_response("2", "Tue, 02 Jan 2024 00:00:00 GMT", 200));
        assert_eq!(cache.total_bytes(), 400);
        // Pushes the total to 600 > 500; evicts oldest until <= 300.
        cache.insert("http://db/new", &cached_response("3", "Wed, 03 Jan 2024 00:00:00 GMT", 200));
        assert!(cache.total_bytes() <= 300);
        assert!(cache.lookup(Method::Get, "http://db/old").is_none());
        assert!(cache.lookup(Method::Get, "http://db/new").is_some());
    }

    #[test]
    fn lookup_ignores_unsafe_methods() {
        let cache = ResponseCache::new(1000, 800);
        cache.insert("http://db/a", &cached_response("1", "Mon, 01 Jan 2024 00:00:00 GMT", 10));
        assert!(cache.lookup(Method::Get, "http://db/a").is_some());
        assert!(cache.lookup(Method::Head, "http://db/a").is_some());
        assert!(cache.lookup(Method::Put, "http://db/a").is_none());
    }

    #[test]
    fn no_cache_and_missing_etag_are_not_cacheable() {
        let plain = Response {
            status: 200,
            headers: Headers::new(),
            charset: None,
            body: ResponseBody::Empty,
        };
        assert!(!ResponseCache::is_cacheable(Method::Get, &plain));

        let mut headers = Headers::new();
        headers.set("ETag", "\"1-a\"");
        headers.set("Cache-Control", "no-cache");
        let no_cache = Response {
            status: 200,
            headers,
            charset: None,
            body: ResponseBody::Empty,
        };
        assert!(!ResponseCache::is_cacheable(Method::Get, &no_cache));

        let ok = cached_response("1", "Mon, 01 Jan 2024 00:00:00 GMT", 4);
        assert!(ResponseCache::is_cacheable(Method::Get, &ok));
        assert!(!ResponseCache::is_cacheable(Method::Post, &ok));
    }

    #[test]
    fn remove_keeps_the_total_consistent() {
        let cache = ResponseCache::new(1000, 800);
        cache.insert("http://db/a", &cached_response("1", "Mon, 01 Jan 2024 00:00:00 GMT", 100));
        cache.remove("http://db/a");
        cache.remove("http://db/a");
        assert_eq!(cache.total_bytes(), 0);
        assert!(cache.is_empty());
    }
}
