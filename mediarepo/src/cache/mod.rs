//! Cache-aside metadata store.
//!
//! ```text
//! CacheAsideStore ──► dyn SharedCache ──► MemoryCache (moka)
//!   │                                      or any external TTL store
//!   └── TtlPolicy (adaptive positive TTL, fixed negative TTL, size cap)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use mediarepo::cache::{CacheAsideStore, FetchOutcome, MemoryCache, TtlPolicy};
//!
//! let store = CacheAsideStore::new(Arc::new(MemoryCache::default()), TtlPolicy::default());
//! let value = store.get_or_compute("key", |_prior| FetchOutcome::Failed {
//!     reason: "offline".into(),
//! });
//! assert!(value.is_absent());
//! ```

mod memory;
mod store;
mod traits;
mod ttl;

pub use memory::{
    MemoryCache, MemoryCacheConfig, DEFAULT_MEMORY_CACHE_BYTES, DEFAULT_STALE_GRACE_SECS,
    MAX_KEY_BYTES,
};
pub use store::{CacheAsideStore, FetchOutcome, StoreDecision};
pub use traits::{
    CacheLookup, CachedValue, Computed, RecomputeFn, ServiceCacheError, SharedCache, Ttl,
};
pub use ttl::{
    TtlPolicy, TtlPolicyError, DEFAULT_MAX_CACHED_BYTES, DEFAULT_MAX_TTL_SECS,
    DEFAULT_MIN_TTL_SECS, DEFAULT_NEGATIVE_TTL_SECS, DEFAULT_TTL_FACTOR,
};
