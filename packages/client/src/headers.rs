//! Case-insensitive header map
//!
//! Lookups and mutation are keyed on the lowercased name; insertion
//! order is preserved for the wire. Rendering restores conventional
//! `Word-Word` casing, with the handful of all-caps segments HTTP
//! traditionally spells that way.

use std::fmt;

/// Header names whose canonical spelling uppercases a whole segment.
const ACRONYM_SEGMENTS: &[&str] = &["dnt", "md5", "p3p", "te", "www"];

/// An ordered header collection with case-insensitive names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    // (lowercased name, value), in insertion order.
    entries: Vec<(String, String)>,
}

impl Headers {
    #[must_use]
    pub fn new() -> Self {
        Headers::default()
    }

    /// The value for a header, or `None` when absent.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.entries
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }

    /// The value for a header, or `default` when absent.
    #[must_use]
    pub fn get_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.get(name).unwrap_or(default)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Sets a header, replacing any existing value.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let key = name.to_ascii_lowercase();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Sets a header only when it is not already present, so defaults
    /// never override what the caller asked for.
    pub fn set_default(&mut self, name: &str, value: impl Into<String>) {
        if !self.contains(name) {
            self.entries.push((name.to_ascii_lowercase(), value.into()));
        }
    }

    /// Removes a header, returning its value if it was present.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let key = name.to_ascii_lowercase();
        let index = self.entries.iter().position(|(k, _)| *k == key)?;
        Some(self.entries.remove(index).1)
    }

    /// Iterates in insertion order with canonically cased names.
    pub fn iter(&self) -> impl Iterator<Item = (String, &str)> {
        self.entries
            .iter()
            .map(|(key, value)| (canonical_name(key), value.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for Headers {
    fn from_iter<I: IntoIterator<Item = (&'a str, &'a str)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.set(name, value);
        }
        headers
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in self.iter() {
            writeln!(f, "{name}: {value}")?;
        }
        Ok(())
    }
}

/// Restores the conventional spelling of a lowercased header name.
fn canonical_name(name: &str) -> String {
    // Names with a non-segmented conventional spelling.
    if name == "etag" {
        return "ETag".to_string();
    }
    name.split('-')
        .map(|segment| {
            if ACRONYM_SEGMENTS.contains(&segment) {
                segment.to_ascii_uppercase()
            } else {
                let mut out = String::with_capacity(segment.len());
                let mut chars = segment.chars();
                if let Some(first) = chars.next() {
                    out.extend(first.to_uppercase());
                }
                out.push_str(chars.as_str());
                out
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}
