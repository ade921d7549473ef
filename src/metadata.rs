//! gRPC Metadata Map
//!
//! Ordered key to multi-value map used both for the static metadata sent with
//! every Flight SQL call and for the response headers captured from a stream.
//! Keys are stored lowercase, matching gRPC semantics.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Key to multi-value metadata map
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(BTreeMap<String, Vec<String>>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all values of `key` with a single value
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.0.insert(key.to_ascii_lowercase(), vec![value.into()]);
    }

    /// Add a value to `key`, keeping existing values
    pub fn append(&mut self, key: &str, value: impl Into<String>) {
        self.0
            .entry(key.to_ascii_lowercase())
            .or_default()
            .push(value.into());
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(&key.to_ascii_lowercase())
    }

    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.0.get(&key.to_ascii_lowercase()).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over every (key, value) pair, one pair per value
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .flat_map(|(k, vs)| vs.iter().map(move |v| (k.as_str(), v.as_str())))
    }
}

impl FromIterator<(String, String)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut md = Metadata::new();
        for (k, v) in iter {
            md.append(&k, v);
        }
        md
    }
}
