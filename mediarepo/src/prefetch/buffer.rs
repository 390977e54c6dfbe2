//! Per-cycle prefetch buffer.

use std::collections::HashMap;

use bytes::Bytes;

/// Payloads produced by the current prefetch cycle, keyed by cache key.
///
/// Cleared at the start of every prefetch. Entries have no TTL: the buffer
/// short-circuits lookups within one render cycle and is not a cache.
#[derive(Debug, Default)]
pub struct PrefetchBuffer {
    entries: HashMap<String, Bytes>,
}

impl PrefetchBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, payload: Bytes) {
        self.entries.insert(key.into(), payload);
    }

    pub fn get(&self, key: &str) -> Option<&Bytes> {
        self.entries.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Bytes> {
        self.entries.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
