//! Synchronous lookup entry point.
//!
//! ```text
//! fetch(name, params)
//!   ├─ prefetch outstanding? ──► finalize first
//!   ├─ prefetch buffer hit ────► parse and return
//!   ├─ oversized hand-off hit ─► parse and return (once)
//!   └─ store.get_or_compute(key, single-request batch)
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, error, info, trace, warn};

use super::envelope::{classify_response, ApiEnvelope, ImageInfo, ThumbInfo};
use super::error::RepoError;
use super::query::{normalize_title, QueryBuilder, QueryParams, TITLES_PARAM};
use crate::cache::{CacheAsideStore, MemoryCache, SharedCache};
use crate::config::RepoConfig;
use crate::prefetch::{PrefetchStats, PrefetchTarget, Prefetcher, RefreshSampler};
use crate::transport::{BatchTransport, Response};

/// Cached, prefetch-aware client for one remote media repository.
///
/// All methods run on the caller's thread. Call [`close`](Self::close)
/// before dropping, or an outstanding prefetch batch is abandoned.
pub struct MetadataRepo {
    queries: QueryBuilder,
    transport: BatchTransport,
    store: CacheAsideStore,
    prefetcher: Prefetcher,
    /// Every key this repo has derived per normalized title, so a purge
    /// also reaches thumbnail sizes and ad-hoc parameter sets.
    derived: HashMap<String, HashSet<String>>,
}

impl MetadataRepo {
    /// Build a repo backed by a private in-memory cache.
    pub fn new(config: RepoConfig) -> Result<Self, RepoError> {
        let cache = Arc::new(MemoryCache::new(config.cache.clone()));
        Self::with_cache(config, cache)
    }

    /// Build a repo over an existing shared cache.
    pub fn with_cache(config: RepoConfig, cache: Arc<dyn SharedCache>) -> Result<Self, RepoError> {
        config.validate()?;

        let queries = QueryBuilder::new(config.api)?;
        let transport = BatchTransport::new(config.transport)?;
        let store = CacheAsideStore::new(cache, config.ttl);
        let prefetcher = Prefetcher::new(config.prefetch, classify_response);

        info!(
            endpoint = %queries.config().endpoint,
            repo = %queries.config().repo_name,
            variants = queries.config().variants.len(),
            "Metadata repo ready"
        );

        Ok(Self {
            queries,
            transport,
            store,
            prefetcher,
            derived: HashMap::new(),
        })
    }

    /// Replace the random source for early-refresh decisions.
    pub fn with_sampler(mut self, sampler: Box<dyn RefreshSampler>) -> Self {
        self.prefetcher = self.prefetcher.with_sampler(sampler);
        self
    }

    pub fn queries(&self) -> &QueryBuilder {
        &self.queries
    }

    pub fn store(&self) -> &CacheAsideStore {
        &self.store
    }

    pub fn is_prefetch_pending(&self) -> bool {
        self.prefetcher.is_pending()
    }

    /// Cache key for an image-info lookup of `name` with `extra` params.
    pub fn cache_key(&self, name: &str, extra: &QueryParams) -> String {
        self.queries
            .cache_key(&self.queries.image_info_params(name, extra))
    }

    /// Primary key followed by one key per configured variant. Keys only
    /// known from earlier lookups are not included; see
    /// [`known_keys`](Self::known_keys).
    pub fn keys_for(&self, name: &str) -> Vec<String> {
        let mut keys = vec![self.cache_key(name, &QueryParams::new())];
        keys.extend(
            self.queries
                .config()
                .variants
                .iter()
                .map(|v| self.cache_key(name, &v.params)),
        );
        keys
    }

    /// Every key of `name` this repo may have cached: the configured ones
    /// plus any derived by earlier lookups, sorted.
    pub fn known_keys(&self, name: &str) -> Vec<String> {
        let mut keys: HashSet<String> = self.keys_for(name).into_iter().collect();
        if let Some(seen) = self.derived.get(&normalize_title(name)) {
            keys.extend(seen.iter().cloned());
        }
        let mut keys: Vec<String> = keys.into_iter().collect();
        keys.sort();
        keys
    }

    /// Start fetching everything `names` will need, without waiting.
    pub fn prefetch<I, S>(&mut self, names: I) -> Result<(), RepoError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let variants = self.queries.config().variants.clone();
        let mut targets = Vec::new();
        for name in names {
            let name = name.as_ref();
            let param_sets = std::iter::once(QueryParams::new())
                .chain(variants.iter().map(|v| v.params.clone()));
            for extra in param_sets {
                let params = self.queries.image_info_params(name, &extra);
                let key = self.queries.cache_key(&params);
                self.remember(&params, &key);
                targets.push(PrefetchTarget {
                    name: name.to_string(),
                    key,
                    request: self.queries.request(&params),
                });
            }
        }

        self.prefetcher
            .prefetch(targets, &mut self.transport, &self.store)?;
        Ok(())
    }

    /// Wait for the outstanding prefetch and commit it.
    pub fn finalize(&mut self) -> Result<PrefetchStats, RepoError> {
        Ok(self.prefetcher.finalize(&mut self.transport, &self.store)?)
    }

    /// Image-info envelope for `name` with `extra` params layered on the
    /// configured defaults. `None` when the lookup failed.
    pub fn fetch(&mut self, name: &str, extra: &QueryParams) -> Option<ApiEnvelope> {
        let params = self.queries.image_info_params(name, extra);
        self.query(&params)
    }

    /// Run an arbitrary query through the buffer and cache.
    pub fn query(&mut self, params: &QueryParams) -> Option<ApiEnvelope> {
        self.settle_prefetch();

        let key = self.queries.cache_key(params);
        self.remember(params, &key);
        if let Some(payload) = self.prefetcher.buffered(&key) {
            trace!(key = %key, "Prefetch buffer hit");
            return decode(&key, payload);
        }
        if let Some(payload) = self.prefetcher.take_oversized(&key) {
            trace!(key = %key, size = payload.len(), "Oversized prefetch hand-off");
            return decode(&key, &payload);
        }

        let request = self.queries.request(params);
        let transport = &self.transport;
        let value = self.store.get_or_compute(&key, |_prior| {
            let response = transport
                .run_batch(vec![request])
                .into_iter()
                .next()
                .unwrap_or_else(|| Response::transport_failure("batch returned no response"));
            classify_response(&response)
        });

        match value.payload() {
            Some(payload) => decode(&key, payload),
            None => {
                debug!(key = %key, "Lookup resolved to absent");
                None
            }
        }
    }

    /// First image-info revision of `name`.
    pub fn image_info(&mut self, name: &str) -> Option<ImageInfo> {
        let title = normalize_title(name);
        self.fetch(name, &QueryParams::new())?
            .first_image_info(&title)
            .cloned()
    }

    /// Thumbnail of `name` scaled to `width` (and `height`, if given).
    pub fn thumb_url(
        &mut self,
        name: &str,
        width: u32,
        height: Option<u32>,
        param: Option<&str>,
    ) -> Option<ThumbInfo> {
        let title = normalize_title(name);
        let extra = QueryBuilder::thumb_params(width, height, param);
        let envelope = self.fetch(name, &extra)?;
        ThumbInfo::from_image_info(envelope.first_image_info(&title)?)
    }

    /// Titles of files whose content has the given base-36 SHA-1.
    pub fn find_by_sha1(&mut self, hash: &str) -> Vec<String> {
        self.query(&QueryBuilder::sha1_params(hash))
            .map(|env| env.allimages_titles())
            .unwrap_or_default()
    }

    /// Evict every cached key of `name`: the configured ones and any other
    /// parameter set looked up through this repo. Returns how many entries
    /// existed.
    pub fn purge(&mut self, name: &str) -> usize {
        // A batch committed after the purge would reinstate the old value.
        self.settle_prefetch();

        let keys = self.known_keys(name);
        self.derived.remove(&normalize_title(name));

        let mut evicted = 0;
        for key in keys {
            self.prefetcher.forget(&key);
            if self.store.purge(&key) {
                evicted += 1;
            }
        }
        info!(name, evicted, "Purged cached metadata");
        evicted
    }

    /// Finalize any outstanding prefetch, then release the transport.
    pub fn close(self) -> Result<PrefetchStats, RepoError> {
        let Self {
            mut transport,
            store,
            mut prefetcher,
            ..
        } = self;

        let stats = prefetcher.finalize(&mut transport, &store)?;
        prefetcher.reset();
        transport.shutdown()?;
        debug!(stats = %stats, "Metadata repo closed");
        Ok(stats)
    }

    /// Index `key` under the title it looks up, if it names one.
    fn remember(&mut self, params: &QueryParams, key: &str) {
        if let Some(title) = params.get(TITLES_PARAM) {
            self.derived
                .entry(normalize_title(title))
                .or_default()
                .insert(key.to_string());
        }
    }

    fn settle_prefetch(&mut self) {
        if !self.prefetcher.is_pending() {
            return;
        }
        if let Err(e) = self.prefetcher.finalize(&mut self.transport, &self.store) {
            error!(error = %e, "Finalizing prefetch before lookup failed");
        }
    }
}

fn decode(key: &str, payload: &Bytes) -> Option<ApiEnvelope> {
    match ApiEnvelope::parse(payload) {
        Ok(envelope) => Some(envelope),
        Err(e) => {
            warn!(key, error = %e, "Cached payload is not a valid envelope");
            None
        }
    }
}
