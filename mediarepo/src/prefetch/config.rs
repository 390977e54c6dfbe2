//! Prefetch configuration.
//!
//! The refresh thresholds are heuristics; tune them per deployment.

use std::time::Duration;

/// Default remaining-TTL threshold below which early refresh is considered.
pub const DEFAULT_LOW_WATER_SECS: u64 = 10;

/// Configuration for the [`Prefetcher`](super::Prefetcher).
#[derive(Debug, Clone, PartialEq)]
pub struct PrefetchConfig {
    /// When false, `prefetch` is a no-op and every lookup goes on demand.
    pub enabled: bool,

    /// Cached keys with less remaining TTL than this may be refreshed early.
    pub low_water: Duration,

    /// Band above `low_water` in which refresh is still considered, with a
    /// probability falling linearly from 1 at `low_water` to 0 at
    /// `low_water + refresh_window`.
    pub refresh_window: Duration,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            low_water: Duration::from_secs(DEFAULT_LOW_WATER_SECS),
            refresh_window: Duration::from_secs(DEFAULT_LOW_WATER_SECS),
        }
    }
}

impl PrefetchConfig {
    pub fn with_low_water(mut self, low_water: Duration) -> Self {
        self.low_water = low_water;
        self
    }

    pub fn with_refresh_window(mut self, window: Duration) -> Self {
        self.refresh_window = window;
        self
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Chance that an entry with `remaining` TTL is refetched early.
    ///
    /// `1 - max(0, remaining - low_water) / window`, clamped to `[0, 1]`:
    /// certain below `low_water`, never at or beyond `low_water + window`.
    pub fn refresh_probability(&self, remaining: Duration) -> f64 {
        if self.refresh_window.is_zero() {
            return if remaining < self.low_water { 1.0 } else { 0.0 };
        }
        let over = remaining.saturating_sub(self.low_water);
        let ratio = over.as_secs_f64() / self.refresh_window.as_secs_f64();
        (1.0 - ratio).clamp(0.0, 1.0)
    }
}
