//! Speculative prefetching of cache entries.
//!
//! Given the cache keys a render cycle is likely to need, the
//! [`Prefetcher`] serves what it can from the shared cache, refreshes
//! entries close to expiry with a probability that rises as they age, and
//! fetches the rest in one async batch. Results land in a per-cycle
//! [`PrefetchBuffer`] that synchronous lookups consult first.
//!
//! # Example
//!
//! ```ignore
//! use mediarepo::prefetch::{FixedSampler, PrefetchConfig, Prefetcher};
//!
//! let mut prefetcher = Prefetcher::new(PrefetchConfig::default(), classify)
//!     .with_sampler(Box::new(FixedSampler::never_refresh()));
//! prefetcher.prefetch(targets, &mut transport, &store)?;
//! // ... render ...
//! let stats = prefetcher.finalize(&mut transport, &store)?;
//! ```

mod buffer;
mod config;
mod prefetcher;
mod sampler;
mod stats;

pub use buffer::PrefetchBuffer;
pub use config::{PrefetchConfig, DEFAULT_LOW_WATER_SECS};
pub use prefetcher::{PrefetchTarget, Prefetcher, ResponseClassifier};
pub use sampler::{FixedSampler, RandomSampler, RefreshSampler};
pub use stats::PrefetchStats;
