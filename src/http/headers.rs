//! Ordered header storage for [`HttpRequest`](crate::http::request::HttpRequest).
//!
//! Request headers are kept as an ordered list rather than a map: insertion
//! order is preserved and a header name may appear more than once, exactly as
//! it arrived on the wire. Lookup is case-insensitive and returns the first
//! occurrence. No HTTP semantics are enforced here; the parser and the
//! handler layer decide which headers matter.

pub struct HeaderMap {
    entries: Vec<(String, String)>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn append(&mut self, name: &str, value: &str) {
        self.entries.push((name.to_string(), value.to_string()));
    }

    /// First value stored under `name`, compared case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
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
}

impl Default for HeaderMap {
    fn default() -> Self {
        Self::new()
    }
}
