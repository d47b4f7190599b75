//! HTTP date parsing
//!
//! Eviction orders cache entries by their `Date` response header,
//! which RFC 7231 allows in three formats. IMF-fixdate is what real
//! servers send; RFC 850 and asctime are accepted for completeness.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

/// Parses an HTTP date header value, `None` when unrecognizable.
#[must_use]
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    // IMF-fixdate / RFC 850 both carry an offset token.
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%A, %d-%b-%y %H:%M:%S GMT") {
        return Some(Utc.from_utc_datetime(&dt));
    }
    // asctime: "Sun Nov  6 08:49:37 1994"
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%a %b %e %H:%M:%S %Y") {
        return Some(Utc.from_utc_datetime(&dt));
    }
    None
}
