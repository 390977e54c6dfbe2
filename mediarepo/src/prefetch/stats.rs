//! Counters for one prefetch cycle.

use std::fmt;

/// What a prefetch cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefetchStats {
    /// Distinct names submitted.
    pub names: usize,
    /// Distinct cache keys derived from those names.
    pub keys: usize,
    /// Keys answered from the shared cache without fetching.
    pub served_from_cache: usize,
    /// Keys holding a negative entry, left unfetched.
    pub negative_hits: usize,
    /// Cached keys refetched early because they were close to expiry.
    pub eager_refreshes: usize,
    /// Requests placed in the batch.
    pub fetched: usize,
    /// Fetched payloads written to the buffer.
    pub committed: usize,
    /// Fetched payloads over the size cap, handed off but not cached.
    pub oversized: usize,
    /// Fetches that produced no usable payload.
    pub failed: usize,
}

impl fmt::Display for PrefetchStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "prefetch: {} names, {} keys, {} cached, {} refreshed, {} fetched ({} committed, {} oversized, {} failed)",
            self.names,
            self.keys,
            self.served_from_cache,
            self.eager_refreshes,
            self.fetched,
            self.committed,
            self.oversized,
            self.failed
        )
    }
}
