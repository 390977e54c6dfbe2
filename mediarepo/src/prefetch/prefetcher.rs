//! Speculative batch prefetch.
//!
//! # Cycle
//!
//! ```text
//! prefetch(targets)
//!   1. clear buffer and hand-off map
//!   2. bulk-read cache for every key
//!   3. per key:  miss ───────────────────────────► fetch
//!                hit, draw < p(ttl) ─────────────► fetch (eager refresh)
//!                hit otherwise ──────────────────► buffer (payload) / skip (negative)
//!   4. start_async(one GET per fetched key)
//!
//! finalize()
//!   finish_async, then per response:
//!     usable, within cap ─► cache + buffer
//!     usable, oversized ──► hand-off map only
//!     unusable ───────────► log, leave cache untouched
//! ```
//!
//! The prefetcher borrows the transport and store from its owner for each
//! call, so all state changes happen on the owner's thread.

use std::collections::{HashMap, HashSet};

use bytes::Bytes;
use tracing::{debug, info, warn};

use super::buffer::PrefetchBuffer;
use super::config::PrefetchConfig;
use super::sampler::{RandomSampler, RefreshSampler};
use super::stats::PrefetchStats;
use crate::cache::{CacheAsideStore, CachedValue, FetchOutcome, StoreDecision};
use crate::transport::{BatchError, BatchTransport, Request, Response};

/// Turns a raw response into a fetch outcome.
pub type ResponseClassifier = fn(&Response) -> FetchOutcome;

/// One cache key a prefetch may fill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefetchTarget {
    /// Resource name the key was derived from.
    pub name: String,
    pub key: String,
    pub request: Request,
}

/// Batches cache misses for a set of names into one async round trip.
pub struct Prefetcher {
    config: PrefetchConfig,
    sampler: Box<dyn RefreshSampler>,
    classify: ResponseClassifier,
    buffer: PrefetchBuffer,
    /// Oversized payloads, consumed once by the next synchronous lookup.
    handoff: HashMap<String, Bytes>,
    /// Keys of the in-flight batch, positionally matching its requests.
    pending: Vec<String>,
    stats: PrefetchStats,
}

impl Prefetcher {
    pub fn new(config: PrefetchConfig, classify: ResponseClassifier) -> Self {
        Self {
            config,
            sampler: Box::new(RandomSampler::new()),
            classify,
            buffer: PrefetchBuffer::new(),
            handoff: HashMap::new(),
            pending: Vec::new(),
            stats: PrefetchStats::default(),
        }
    }

    /// Replace the random source used for early-refresh decisions.
    pub fn with_sampler(mut self, sampler: Box<dyn RefreshSampler>) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn config(&self) -> &PrefetchConfig {
        &self.config
    }

    /// True while a prefetch batch has been started but not finalized.
    pub fn is_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Whether `key` belongs to the outstanding batch.
    pub fn is_key_pending(&self, key: &str) -> bool {
        self.pending.iter().any(|k| k == key)
    }

    /// Plan and start a prefetch for `targets`.
    ///
    /// An outstanding batch from an earlier call is finalized first.
    pub fn prefetch(
        &mut self,
        targets: Vec<PrefetchTarget>,
        transport: &mut BatchTransport,
        store: &CacheAsideStore,
    ) -> Result<(), BatchError> {
        if self.is_pending() {
            debug!(
                pending = self.pending.len(),
                "Finalizing previous prefetch before starting a new one"
            );
            self.finalize(transport, store)?;
        }

        self.buffer.clear();
        self.handoff.clear();
        self.stats = PrefetchStats::default();

        if !self.config.enabled {
            return Ok(());
        }

        let mut seen = HashSet::new();
        let targets: Vec<PrefetchTarget> = targets
            .into_iter()
            .filter(|t| seen.insert(t.key.clone()))
            .collect();
        let names: HashSet<&str> = targets.iter().map(|t| t.name.as_str()).collect();
        self.stats.names = names.len();
        self.stats.keys = targets.len();

        let keys: Vec<String> = targets.iter().map(|t| t.key.clone()).collect();
        let cached = store.peek_many(&keys);

        let mut requests = Vec::new();
        for target in targets {
            let Some(lookup) = cached.get(&target.key) else {
                self.pending.push(target.key);
                requests.push(target.request);
                continue;
            };

            let p = self.config.refresh_probability(lookup.remaining_ttl);
            if p > 0.0 && self.sampler.draw() < p {
                debug!(
                    key = %target.key,
                    remaining_ms = lookup.remaining_ttl.as_millis() as u64,
                    probability = p,
                    "Refreshing cache entry early"
                );
                self.stats.eager_refreshes += 1;
                self.pending.push(target.key);
                requests.push(target.request);
                continue;
            }

            match &lookup.value {
                CachedValue::Payload(payload) => {
                    self.buffer.insert(target.key, payload.clone());
                    self.stats.served_from_cache += 1;
                }
                CachedValue::Absent => self.stats.negative_hits += 1,
            }
        }

        self.stats.fetched = requests.len();
        if requests.is_empty() {
            debug!(keys = self.stats.keys, "Prefetch fully served from cache");
            return Ok(());
        }

        if let Err(e) = transport.start_async(requests) {
            self.pending.clear();
            return Err(e);
        }
        debug!(
            names = self.stats.names,
            fetching = self.stats.fetched,
            buffered = self.buffer.len(),
            "Prefetch batch started"
        );
        Ok(())
    }

    /// Wait for the outstanding batch, if any, and commit its results.
    ///
    /// Calling this again without a new `prefetch` returns the same stats.
    pub fn finalize(
        &mut self,
        transport: &mut BatchTransport,
        store: &CacheAsideStore,
    ) -> Result<PrefetchStats, BatchError> {
        if !self.is_pending() {
            return Ok(self.stats.clone());
        }

        let keys = std::mem::take(&mut self.pending);
        let responses = transport.finish_async()?;

        for (key, response) in keys.into_iter().zip(responses) {
            match (self.classify)(&response) {
                FetchOutcome::Fetched {
                    payload,
                    last_modified,
                } => match store.store_fetched(&key, &payload, last_modified) {
                    StoreDecision::TooLarge => {
                        self.stats.oversized += 1;
                        self.handoff.insert(key, payload);
                    }
                    StoreDecision::Stored(_) | StoreDecision::Skipped => {
                        self.stats.committed += 1;
                        self.buffer.insert(key, payload);
                    }
                },
                FetchOutcome::Failed { reason } => {
                    warn!(key = %key, reason = %reason, "Prefetch fetch failed");
                    self.stats.failed += 1;
                }
            }
        }

        info!(stats = %self.stats, "Prefetch finalized");
        Ok(self.stats.clone())
    }

    /// Payload buffered for `key` in this cycle.
    pub fn buffered(&self, key: &str) -> Option<&Bytes> {
        self.buffer.get(key)
    }

    /// Take the oversized payload fetched for `key`, if any. Each payload
    /// is handed out once.
    pub fn take_oversized(&mut self, key: &str) -> Option<Bytes> {
        self.handoff.remove(key)
    }

    /// Drop everything held for `key` in this cycle.
    pub fn forget(&mut self, key: &str) {
        self.buffer.remove(key);
        self.handoff.remove(key);
    }

    /// Empty the buffer and hand-off map. Used at shutdown, after
    /// finalizing.
    pub fn reset(&mut self) {
        debug_assert!(self.pending.is_empty(), "reset with a prefetch in flight");
        self.buffer.clear();
        self.handoff.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MemoryCache, SharedCache, TtlPolicy};
    use crate::prefetch::sampler::FixedSampler;
    use crate::transport::TransportConfig;
    use std::sync::Arc;
    use std::time::Duration;

    /// Loopback port 1 refuses connections, so every fetch fails fast.
    const DEAD_URL: &str = "http://127.0.0.1:1/api.php";

    fn target(name: &str) -> PrefetchTarget {
        PrefetchTarget {
            name: name.to_string(),
            key: format!("key:{}", name),
            request: Request::get(DEAD_URL).query("titles", name).build(),
        }
    }

    fn accept_all(response: &Response) -> FetchOutcome {
        if response.is_success() {
            FetchOutcome::Fetched {
                payload: response.body.clone(),
                last_modified: None,
            }
        } else {
            FetchOutcome::Failed {
                reason: response.status_line(),
            }
        }
    }

    struct Fixture {
        transport: BatchTransport,
        store: CacheAsideStore,
        cache: Arc<MemoryCache>,
    }

    fn fixture() -> Fixture {
        let cache = Arc::new(MemoryCache::default());
        let config = TransportConfig::default().with_connect_timeout(Duration::from_secs(2));
        Fixture {
            transport: BatchTransport::new(config).unwrap(),
            store: CacheAsideStore::new(cache.clone(), TtlPolicy::default()),
            cache,
        }
    }

    fn prefetcher(sampler: FixedSampler) -> Prefetcher {
        Prefetcher::new(PrefetchConfig::default(), accept_all).with_sampler(Box::new(sampler))
    }

    fn batch_titles(transport: &BatchTransport) -> Vec<String> {
        transport
            .in_flight_requests()
            .unwrap_or_default()
            .iter()
            .flat_map(|r| r.query().iter())
            .filter(|(k, _)| k == "titles")
            .map(|(_, v)| v.clone())
            .collect()
    }

    #[test]
    fn test_near_expiry_hit_not_refreshed_when_sampler_says_no() {
        let mut f = fixture();
        f.cache
            .set(
                "key:A.png",
                CachedValue::Payload(Bytes::from_static(b"a")),
                Duration::from_secs(5),
            )
            .unwrap();

        let mut p = prefetcher(FixedSampler::never_refresh());
        p.prefetch(vec![target("A.png"), target("B.png")], &mut f.transport, &f.store)
            .unwrap();

        assert_eq!(batch_titles(&f.transport), vec!["B.png".to_string()]);
        assert_eq!(p.buffered("key:A.png"), Some(&Bytes::from_static(b"a")));
        assert!(p.is_key_pending("key:B.png"));
        assert!(!p.is_key_pending("key:A.png"));

        let stats = p.finalize(&mut f.transport, &f.store).unwrap();
        assert_eq!(stats.served_from_cache, 1);
        assert_eq!(stats.fetched, 1);
        assert_eq!(stats.eager_refreshes, 0);
    }

    #[test]
    fn test_near_expiry_hit_refreshed_when_sampler_says_yes() {
        let mut f = fixture();
        f.cache
            .set(
                "key:A.png",
                CachedValue::Payload(Bytes::from_static(b"a")),
                Duration::from_secs(5),
            )
            .unwrap();

        let mut p = prefetcher(FixedSampler::always_refresh());
        p.prefetch(vec![target("A.png"), target("B.png")], &mut f.transport, &f.store)
            .unwrap();

        let mut titles = batch_titles(&f.transport);
        titles.sort();
        assert_eq!(titles, vec!["A.png".to_string(), "B.png".to_string()]);
        // The stale value is not served into the buffer for this cycle.
        assert!(p.buffered("key:A.png").is_none());

        let stats = p.finalize(&mut f.transport, &f.store).unwrap();
        assert_eq!(stats.eager_refreshes, 1);
        assert_eq!(stats.fetched, 2);
    }

    #[test]
    fn test_refresh_band_above_low_water_is_probabilistic() {
        let mut f = fixture();
        for (name, secs) in [("A.png", 12), ("B.png", 16)] {
            f.cache
                .set(
                    &format!("key:{}", name),
                    CachedValue::Payload(Bytes::from_static(b"x")),
                    Duration::from_secs(secs),
                )
                .unwrap();
        }

        // p is about 0.8 for A and 0.4 for B.
        let mut p = prefetcher(FixedSampler(0.6));
        p.prefetch(vec![target("A.png"), target("B.png")], &mut f.transport, &f.store)
            .unwrap();

        assert_eq!(batch_titles(&f.transport), vec!["A.png".to_string()]);
        assert!(p.buffered("key:B.png").is_some());
        let stats = p.finalize(&mut f.transport, &f.store).unwrap();
        assert_eq!(stats.eager_refreshes, 1);
        assert_eq!(stats.served_from_cache, 1);
    }

    #[test]
    fn test_fresh_hit_never_refreshed() {
        let mut f = fixture();
        f.cache
            .set(
                "key:A.png",
                CachedValue::Payload(Bytes::from_static(b"a")),
                Duration::from_secs(3600),
            )
            .unwrap();

        let mut p = prefetcher(FixedSampler::always_refresh());
        p.prefetch(vec![target("A.png")], &mut f.transport, &f.store)
            .unwrap();

        assert!(!f.transport.is_in_flight());
        assert!(!p.is_pending());
        assert!(p.buffered("key:A.png").is_some());
    }

    #[test]
    fn test_negative_entry_is_not_refetched() {
        let mut f = fixture();
        f.cache
            .set("key:A.png", CachedValue::Absent, Duration::from_secs(60))
            .unwrap();

        let mut p = prefetcher(FixedSampler::never_refresh());
        p.prefetch(vec![target("A.png")], &mut f.transport, &f.store)
            .unwrap();

        assert!(!f.transport.is_in_flight());
        let stats = p.finalize(&mut f.transport, &f.store).unwrap();
        assert_eq!(stats.negative_hits, 1);
        assert!(p.buffered("key:A.png").is_none());
    }

    #[test]
    fn test_failed_fetch_leaves_cache_absent() {
        let mut f = fixture();
        let mut p = prefetcher(FixedSampler::never_refresh());
        p.prefetch(vec![target("B.png")], &mut f.transport, &f.store)
            .unwrap();

        let stats = p.finalize(&mut f.transport, &f.store).unwrap();
        assert_eq!(stats.failed, 1);
        assert!(f.cache.get("key:B.png").unwrap().is_none());
        assert!(p.buffered("key:B.png").is_none());
    }

    #[test]
    fn test_finalize_without_prefetch_is_safe_and_idempotent() {
        let mut f = fixture();
        let mut p = prefetcher(FixedSampler::never_refresh());
        assert_eq!(
            p.finalize(&mut f.transport, &f.store).unwrap(),
            PrefetchStats::default()
        );

        p.prefetch(vec![target("B.png")], &mut f.transport, &f.store)
            .unwrap();
        let first = p.finalize(&mut f.transport, &f.store).unwrap();
        let second = p.finalize(&mut f.transport, &f.store).unwrap();
        assert_eq!(first, second);
        assert!(!f.transport.is_in_flight());
    }

    #[test]
    fn test_duplicate_targets_fetched_once() {
        let mut f = fixture();
        let mut p = prefetcher(FixedSampler::never_refresh());
        p.prefetch(
            vec![target("B.png"), target("B.png")],
            &mut f.transport,
            &f.store,
        )
        .unwrap();

        assert_eq!(batch_titles(&f.transport).len(), 1);
        let stats = p.finalize(&mut f.transport, &f.store).unwrap();
        assert_eq!(stats.names, 1);
        assert_eq!(stats.keys, 1);
    }

    #[test]
    fn test_second_prefetch_finalizes_first_and_clears_buffer() {
        let mut f = fixture();
        f.cache
            .set(
                "key:A.png",
                CachedValue::Payload(Bytes::from_static(b"a")),
                Duration::from_secs(3600),
            )
            .unwrap();

        let mut p = prefetcher(FixedSampler::never_refresh());
        p.prefetch(vec![target("A.png"), target("B.png")], &mut f.transport, &f.store)
            .unwrap();
        assert!(p.buffered("key:A.png").is_some());

        p.prefetch(vec![target("C.png")], &mut f.transport, &f.store)
            .unwrap();
        assert!(p.buffered("key:A.png").is_none());
        assert_eq!(batch_titles(&f.transport), vec!["C.png".to_string()]);
        p.finalize(&mut f.transport, &f.store).unwrap();
    }

    #[test]
    fn test_disabled_prefetcher_does_nothing() {
        let mut f = fixture();
        let mut p = Prefetcher::new(PrefetchConfig::disabled(), accept_all);
        p.prefetch(vec![target("B.png")], &mut f.transport, &f.store)
            .unwrap();
        assert!(!f.transport.is_in_flight());
        assert!(!p.is_pending());
    }
}
