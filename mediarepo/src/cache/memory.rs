//! In-process shared cache backed by moka.
//!
//! Each entry carries its own TTL. Entries are kept by moka for the TTL plus
//! a stale grace period: during the grace period the entry is invisible to
//! reads but is handed to recompute callbacks as the prior value.
//!
//! Single-flight recompute uses a per-key `parking_lot::Mutex` held in a
//! `DashMap`; the lock entry is dropped again once no caller holds it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use moka::sync::Cache as MokaCache;
use moka::Expiry;
use parking_lot::Mutex;
use tracing::trace;

use crate::cache::traits::{
    CacheLookup, CachedValue, RecomputeFn, ServiceCacheError, SharedCache, Ttl,
};

/// Default capacity in bytes (64 MB).
pub const DEFAULT_MEMORY_CACHE_BYTES: u64 = 64 * 1024 * 1024;

/// Default time an expired entry is retained for recompute callbacks.
pub const DEFAULT_STALE_GRACE_SECS: u64 = 300;

/// Longest key accepted.
pub const MAX_KEY_BYTES: usize = 250;

/// Configuration for [`MemoryCache`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryCacheConfig {
    pub max_size_bytes: u64,
    pub stale_grace: Duration,
}

impl Default for MemoryCacheConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: DEFAULT_MEMORY_CACHE_BYTES,
            stale_grace: Duration::from_secs(DEFAULT_STALE_GRACE_SECS),
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: CachedValue,
    expires_at: Instant,
    grace: Duration,
}

impl Entry {
    fn remaining(&self, now: Instant) -> Option<Duration> {
        let left = self.expires_at.saturating_duration_since(now);
        (!left.is_zero()).then_some(left)
    }
}

struct EntryExpiry;

impl Expiry<String, Entry> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &Entry,
        created_at: Instant,
    ) -> Option<Duration> {
        Some(value.expires_at.saturating_duration_since(created_at) + value.grace)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Entry,
        updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.expires_at.saturating_duration_since(updated_at) + value.grace)
    }
}

/// Shared cache living in this process.
pub struct MemoryCache {
    entries: MokaCache<String, Entry>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    config: MemoryCacheConfig,
}

impl MemoryCache {
    pub fn new(config: MemoryCacheConfig) -> Self {
        let entries = MokaCache::builder()
            .weigher(|key: &String, entry: &Entry| -> u32 {
                (key.len() + entry.value.weight()).min(u32::MAX as usize) as u32
            })
            .max_capacity(config.max_size_bytes)
            .expire_after(EntryExpiry)
            .build();

        Self {
            entries,
            locks: DashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &MemoryCacheConfig {
        &self.config
    }

    /// Entries held, including ones in their stale grace period.
    pub fn entry_count(&self) -> u64 {
        self.entries.run_pending_tasks();
        self.entries.entry_count()
    }

    pub fn size_bytes(&self) -> u64 {
        self.entries.run_pending_tasks();
        self.entries.weighted_size()
    }

    fn check_key(key: &str) -> Result<(), ServiceCacheError> {
        if key.len() > MAX_KEY_BYTES {
            return Err(ServiceCacheError::KeyTooLarge {
                size: key.len(),
                max: MAX_KEY_BYTES,
            });
        }
        Ok(())
    }

    fn insert(&self, key: &str, value: CachedValue, ttl: Duration) {
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
                grace: self.config.stale_grace,
            },
        );
    }

    fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(MemoryCacheConfig::default())
    }
}

impl SharedCache for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<CachedValue>, ServiceCacheError> {
        Self::check_key(key)?;
        let now = Instant::now();
        Ok(self
            .entries
            .get(key)
            .filter(|entry| entry.remaining(now).is_some())
            .map(|entry| entry.value))
    }

    fn get_multi(
        &self,
        keys: &[String],
    ) -> Result<HashMap<String, CacheLookup>, ServiceCacheError> {
        let now = Instant::now();
        let mut found = HashMap::with_capacity(keys.len());
        for key in keys {
            Self::check_key(key)?;
            if let Some(entry) = self.entries.get(key) {
                if let Some(remaining_ttl) = entry.remaining(now) {
                    found.insert(
                        key.clone(),
                        CacheLookup {
                            value: entry.value,
                            remaining_ttl,
                        },
                    );
                }
            }
        }
        Ok(found)
    }

    fn set(&self, key: &str, value: CachedValue, ttl: Duration) -> Result<(), ServiceCacheError> {
        Self::check_key(key)?;
        if ttl.is_zero() {
            self.entries.invalidate(key);
            return Ok(());
        }
        self.insert(key, value, ttl);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, ServiceCacheError> {
        Self::check_key(key)?;
        Ok(self.entries.remove(key).is_some())
    }

    fn get_with_set_callback(
        &self,
        key: &str,
        callback: RecomputeFn<'_>,
    ) -> Result<CachedValue, ServiceCacheError> {
        Self::check_key(key)?;
        let lock = self.key_lock(key);

        let value = {
            let _guard = lock.lock();
            let existing = self.entries.get(key);
            match existing {
                Some(entry) if entry.remaining(Instant::now()).is_some() => entry.value,
                stale => {
                    trace!(key, had_prior = stale.is_some(), "Recomputing cache entry");
                    let computed = callback(stale.as_ref().map(|entry| &entry.value));
                    match computed.ttl {
                        Ttl::For(ttl) if !ttl.is_zero() => {
                            self.insert(key, computed.value.clone(), ttl)
                        }
                        _ => {}
                    }
                    computed.value
                }
            }
        };

        drop(lock);
        self.locks
            .remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
        Ok(value)
    }
}
