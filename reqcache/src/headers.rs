//! A small ordered, case-insensitive header map.
//!
//! `http::HeaderMap` lowercases names on the way in, which breaks the rule
//! that header lookups must be case-insensitive while the byte-exact name
//! the caller supplied still has to survive to the wire. Hence this
//! hand-rolled, insertion-ordered map.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An explicit sentinel for "this header was absent", distinct from `""` —
/// Vary key derivation must not conflate the two.
pub const ABSENT: &str = "\u{0}absent";

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderMap {
    entries: Vec<(String, String)>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Case-insensitive lookup.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Insert, replacing any existing entry with the same name
    /// case-insensitively. The *new* caller-supplied casing wins.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        if let Some(slot) = self.entries.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(&name)) {
            *slot = (name, value);
        } else {
            self.entries.push((name, value));
        }
    }

    /// Insert only if no entry with this name (case-insensitive) exists yet.
    /// Used for conditional-header synthesis where a user-supplied value
    /// must always win.
    pub fn insert_if_absent(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        if !self.contains(&name) {
            self.entries.push((name, value.into()));
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        let idx = self.entries.iter().position(|(n, _)| n.eq_ignore_ascii_case(name))?;
        Some(self.entries.remove(idx).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Value for `name`, or [`ABSENT`] if there is none.
    pub fn get_or_absent(&self, name: &str) -> String {
        self.get(name).map(str::to_owned).unwrap_or_else(|| ABSENT.to_owned())
    }
}

impl fmt::Debug for HeaderMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries.iter().map(|(k, v)| (k, v))).finish()
    }
}

impl FromIterator<(String, String)> for HeaderMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let mut h = HeaderMap::new();
        h.insert("ETag", "\"e1\"");
        assert_eq!(h.get("etag"), Some("\"e1\""));
        assert_eq!(h.get("ETAG"), Some("\"e1\""));
    }

    #[test]
    fn insert_preserves_caller_casing() {
        let mut h = HeaderMap::new();
        h.insert("Content-Type", "text/plain");
        assert_eq!(h.iter().next(), Some(("Content-Type", "text/plain")));
    }

    #[test]
    fn insert_if_absent_does_not_overwrite() {
        let mut h = HeaderMap::new();
        h.insert("If-None-Match", "\"user\"");
        h.insert_if_absent("If-None-Match", "\"synthesized\"");
        assert_eq!(h.get("if-none-match"), Some("\"user\""));
    }

    #[test]
    fn absent_sentinel_differs_from_empty() {
        let mut h = HeaderMap::new();
        h.insert("Accept", "");
        assert_ne!(h.get_or_absent("Accept"), h.get_or_absent("X-Missing"));
        assert_eq!(h.get_or_absent("Accept"), "");
    }
}
