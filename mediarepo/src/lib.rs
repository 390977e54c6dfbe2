//! mediarepo - batched, cached metadata lookups for remote media repositories
//!
//! This library fetches file metadata and thumbnail information from a
//! MediaWiki-style JSON API with as few round trips as possible:
//!
//! - [`transport`] runs many GET requests concurrently over one pooled,
//!   multiplexed client, either blocking or as a start/finish pair.
//! - [`cache`] layers cache-aside semantics with adaptive TTLs and negative
//!   caching over any shared TTL store.
//! - [`prefetch`] batches the cache misses of a render cycle into one async
//!   round trip and refreshes near-expiry entries early.
//! - [`repo`] is the synchronous lookup facade tying them together.

pub mod cache;
pub mod config;
pub mod logging;
pub mod prefetch;
pub mod repo;
pub mod transport;

pub use config::{ConfigError, RepoConfig};
pub use repo::{ApiEnvelope, MetadataRepo, QueryParams, RepoError};
