//! Dedup sets — keys already recorded by an indexer, consulted before a
//! decoded event is accepted.
//!
//! Keys are compared case-insensitively (addresses and hashes arrive in
//! mixed case depending on the provider).

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// A set of already-captured keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DedupSet {
    keys: BTreeSet<String>,
}

impl DedupSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn normalize(key: &str) -> String {
        key.trim().to_ascii_lowercase()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(&Self::normalize(key))
    }

    /// Insert `key`; returns `true` if it was not present before.
    pub fn insert(&mut self, key: &str) -> bool {
        self.keys.insert(Self::normalize(key))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }
}

/// A result collection paired with its dedup set.
///
/// Records and keys only change together through [`DedupLog::accept`], so a
/// record is never stored without its key and vice versa.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DedupLog<R> {
    #[serde(default)]
    keys: DedupSet,
    #[serde(default = "Vec::new")]
    records: Vec<R>,
}

impl<R> Default for DedupLog<R> {
    fn default() -> Self {
        Self {
            keys: DedupSet::default(),
            records: Vec::new(),
        }
    }
}

impl<R> DedupLog<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `record` under `key` unless the key was seen before.
    /// Returns `true` if the record was accepted.
    pub fn accept(&mut self, key: &str, record: R) -> bool {
        if !self.keys.insert(key) {
            return false;
        }
        self.records.push(record);
        true
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    pub fn keys(&self) -> &DedupSet {
        &self.keys
    }

    pub fn records(&self) -> &[R] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
