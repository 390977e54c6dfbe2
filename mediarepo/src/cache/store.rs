//! Cache-aside store.
//!
//! Wraps a [`SharedCache`] with "get or compute" semantics and applies the
//! [`TtlPolicy`] to whatever the compute function fetched:
//!
//! | Outcome                       | Stored as            | TTL          |
//! |-------------------------------|----------------------|--------------|
//! | fetched, within size cap      | payload              | adaptive     |
//! | fetched, over size cap        | not stored           | -            |
//! | failed, stale payload present | stale payload        | negative     |
//! | failed, nothing usable        | [`CachedValue::Absent`] | negative  |
//!
//! Backend errors are absorbed here: a failing cache degrades to computing
//! the value without storing it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::cache::traits::{CacheLookup, CachedValue, Computed, SharedCache, Ttl};
use crate::cache::ttl::TtlPolicy;

/// Result of a compute function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// A usable payload, with its modification time when known.
    Fetched {
        payload: Bytes,
        last_modified: Option<DateTime<Utc>>,
    },
    /// No usable payload (transport failure, HTTP error, bad envelope).
    Failed { reason: String },
}

/// What [`CacheAsideStore::store_fetched`] did with a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreDecision {
    Stored(Duration),
    TooLarge,
    /// The backend rejected the write.
    Skipped,
}

/// Get-or-compute front end over a shared cache.
#[derive(Clone)]
pub struct CacheAsideStore {
    cache: Arc<dyn SharedCache>,
    policy: TtlPolicy,
}

impl CacheAsideStore {
    pub fn new(cache: Arc<dyn SharedCache>, policy: TtlPolicy) -> Self {
        Self { cache, policy }
    }

    pub fn policy(&self) -> &TtlPolicy {
        &self.policy
    }

    /// Return the live value for `key`, running `compute` on a miss.
    ///
    /// `compute` receives the expired prior value when the backend still
    /// has one. It runs at most once per key per expiry window across all
    /// callers sharing the backend.
    pub fn get_or_compute<F>(&self, key: &str, compute: F) -> CachedValue
    where
        F: FnOnce(Option<&CachedValue>) -> FetchOutcome,
    {
        let mut compute = Some(compute);
        let result = self.cache.get_with_set_callback(
            key,
            Box::new(|prior: Option<&CachedValue>| match compute.take() {
                Some(compute) => {
                    let outcome = compute(prior);
                    self.settle(key, outcome, prior)
                }
                None => Computed {
                    value: CachedValue::Absent,
                    ttl: Ttl::Uncacheable,
                },
            }),
        );

        match result {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "Shared cache unavailable, computing uncached");
                match compute.take() {
                    Some(compute) => self.settle(key, compute(None), None).value,
                    None => CachedValue::Absent,
                }
            }
        }
    }

    /// Live values and remaining TTLs for `keys`. Backend errors read as
    /// all-miss.
    pub fn peek_many(&self, keys: &[String]) -> HashMap<String, CacheLookup> {
        match self.cache.get_multi(keys) {
            Ok(found) => found,
            Err(e) => {
                warn!(keys = keys.len(), error = %e, "Bulk cache read failed");
                HashMap::new()
            }
        }
    }

    /// Write a freshly fetched payload through to the cache.
    pub fn store_fetched(
        &self,
        key: &str,
        payload: &Bytes,
        last_modified: Option<DateTime<Utc>>,
    ) -> StoreDecision {
        if !self.policy.is_cacheable_size(payload.len()) {
            debug!(
                key,
                size = payload.len(),
                max = self.policy.max_cached_bytes,
                "Payload too large, not caching"
            );
            return StoreDecision::TooLarge;
        }
        let ttl = self.policy.positive_ttl(last_modified, Utc::now());
        match self
            .cache
            .set(key, CachedValue::Payload(payload.clone()), ttl)
        {
            Ok(()) => StoreDecision::Stored(ttl),
            Err(e) => {
                warn!(key, error = %e, "Cache write failed");
                StoreDecision::Skipped
            }
        }
    }

    /// Evict `key`. Returns whether an entry existed.
    pub fn purge(&self, key: &str) -> bool {
        match self.cache.delete(key) {
            Ok(existed) => {
                debug!(key, existed, "Purged cache entry");
                existed
            }
            Err(e) => {
                warn!(key, error = %e, "Cache purge failed");
                false
            }
        }
    }

    fn settle(&self, key: &str, outcome: FetchOutcome, prior: Option<&CachedValue>) -> Computed {
        match outcome {
            FetchOutcome::Fetched {
                payload,
                last_modified,
            } => {
                if !self.policy.is_cacheable_size(payload.len()) {
                    debug!(
                        key,
                        size = payload.len(),
                        max = self.policy.max_cached_bytes,
                        "Payload too large, not caching"
                    );
                    return Computed {
                        value: CachedValue::Payload(payload),
                        ttl: Ttl::Uncacheable,
                    };
                }
                let ttl = self.policy.positive_ttl(last_modified, Utc::now());
                debug!(key, ttl_secs = ttl.as_secs(), "Caching fetched payload");
                Computed {
                    value: CachedValue::Payload(payload),
                    ttl: Ttl::For(ttl),
                }
            }
            FetchOutcome::Failed { reason } => {
                let ttl = Ttl::For(self.policy.negative_ttl());
                match prior.and_then(CachedValue::payload) {
                    Some(stale) => {
                        warn!(key, reason = %reason, "Fetch failed, re-serving stale payload");
                        Computed {
                            value: CachedValue::Payload(stale.clone()),
                            ttl,
                        }
                    }
                    None => {
                        warn!(key, reason = %reason, "Fetch failed, caching negative entry");
                        Computed {
                            value: CachedValue::Absent,
                            ttl,
                        }
                    }
                }
            }
        }
    }
}
