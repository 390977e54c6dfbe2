//! Contract of the shared TTL cache.
//!
//! The orchestration layer treats the shared cache as a black box keyed by
//! string with per-entry TTLs. Anything satisfying [`SharedCache`] can sit
//! behind the [`CacheAsideStore`](super::CacheAsideStore): the in-process
//! [`MemoryCache`](super::MemoryCache), or an adapter over an external
//! store.
//!
//! # Single-flight
//!
//! [`SharedCache::get_with_set_callback`] must run the callback at most once
//! per key per expiry window, even with concurrent callers. The cache-aside
//! layer relies on this and does not add its own locking.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;

/// A cached value: a payload, or a negative entry recording a failed fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedValue {
    Payload(Bytes),
    /// The last fetch failed; treat the resource as absent until expiry.
    Absent,
}

impl CachedValue {
    pub fn payload(&self) -> Option<&Bytes> {
        match self {
            CachedValue::Payload(bytes) => Some(bytes),
            CachedValue::Absent => None,
        }
    }

    pub fn into_payload(self) -> Option<Bytes> {
        match self {
            CachedValue::Payload(bytes) => Some(bytes),
            CachedValue::Absent => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, CachedValue::Absent)
    }

    /// Approximate size used for capacity accounting.
    pub fn weight(&self) -> usize {
        match self {
            CachedValue::Payload(bytes) => bytes.len(),
            CachedValue::Absent => 1,
        }
    }
}

/// A live value together with how long it has left.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheLookup {
    pub value: CachedValue,
    pub remaining_ttl: Duration,
}

/// How long a recomputed value may be kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    For(Duration),
    /// Return the value to the caller but do not store it.
    Uncacheable,
}

impl fmt::Display for Ttl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ttl::For(d) => write!(f, "{}s", d.as_secs()),
            Ttl::Uncacheable => write!(f, "uncacheable"),
        }
    }
}

/// Output of a recompute callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Computed {
    pub value: CachedValue,
    pub ttl: Ttl,
}

/// Recompute callback handed to [`SharedCache::get_with_set_callback`].
///
/// Receives the prior value if the cache still holds an expired copy.
pub type RecomputeFn<'a> = Box<dyn FnOnce(Option<&CachedValue>) -> Computed + 'a>;

/// Errors surfaced by a shared cache backend.
#[derive(Debug, Error)]
pub enum ServiceCacheError {
    /// The backend could not be reached.
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),

    /// Key exceeds maximum allowed size.
    #[error("key too large: {size} bytes (max: {max})")]
    KeyTooLarge { size: usize, max: usize },

    /// Backend-specific failure.
    #[error("cache provider error: {0}")]
    Provider(String),
}

/// Shared key-value cache with TTL semantics.
pub trait SharedCache: Send + Sync {
    /// Fetch a live value.
    fn get(&self, key: &str) -> Result<Option<CachedValue>, ServiceCacheError>;

    /// Fetch live values and their remaining TTLs for many keys at once.
    ///
    /// Keys without a live value are absent from the returned map.
    fn get_multi(&self, keys: &[String])
        -> Result<HashMap<String, CacheLookup>, ServiceCacheError>;

    /// Store `value` for `ttl`.
    fn set(&self, key: &str, value: CachedValue, ttl: Duration) -> Result<(), ServiceCacheError>;

    /// Remove `key`. Returns whether an entry existed.
    fn delete(&self, key: &str) -> Result<bool, ServiceCacheError>;

    /// Return the live value for `key`, or run `callback` to produce and
    /// store a new one. Concurrent callers for one key share one callback
    /// invocation.
    fn get_with_set_callback(
        &self,
        key: &str,
        callback: RecomputeFn<'_>,
    ) -> Result<CachedValue, ServiceCacheError>;
}
