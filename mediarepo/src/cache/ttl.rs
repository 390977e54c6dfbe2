//! Adaptive TTL policy.
//!
//! Successful fetches are kept for a time proportional to how long the
//! content has gone unmodified:
//!
//! ```text
//! ttl = clamp(age * factor, min_ttl, max_ttl)     age = now - last_modified
//! ```
//!
//! Recently edited content expires quickly; long-stable content approaches
//! `max_ttl`. Failed fetches get the fixed `negative_ttl`, which is always
//! strictly shorter than `min_ttl`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Default floor for positive entries (30 seconds).
pub const DEFAULT_MIN_TTL_SECS: u64 = 30;

/// Default ceiling for positive entries (4 hours).
pub const DEFAULT_MAX_TTL_SECS: u64 = 4 * 60 * 60;

/// Default fraction of content age used as TTL.
pub const DEFAULT_TTL_FACTOR: f64 = 0.2;

/// Default TTL for negative entries (10 seconds).
pub const DEFAULT_NEGATIVE_TTL_SECS: u64 = 10;

/// Default largest payload written to the shared cache (2 MB).
pub const DEFAULT_MAX_CACHED_BYTES: usize = 2 * 1024 * 1024;

/// Invalid TTL policy settings.
#[derive(Debug, Error, PartialEq)]
pub enum TtlPolicyError {
    #[error("min_ttl ({min}s) must not exceed max_ttl ({max}s)")]
    MinAboveMax { min: u64, max: u64 },

    #[error("negative_ttl ({negative}s) must be shorter than min_ttl ({min}s)")]
    NegativeNotShorter { negative: u64, min: u64 },

    #[error("negative_ttl must be non-zero")]
    ZeroNegative,

    #[error("ttl factor must be a positive finite number, got {0}")]
    BadFactor(f64),
}

/// TTL decisions for the cache-aside store.
#[derive(Debug, Clone, PartialEq)]
pub struct TtlPolicy {
    pub min_ttl: Duration,
    pub max_ttl: Duration,
    pub factor: f64,
    pub negative_ttl: Duration,
    /// Payloads larger than this are returned but never cached.
    pub max_cached_bytes: usize,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            min_ttl: Duration::from_secs(DEFAULT_MIN_TTL_SECS),
            max_ttl: Duration::from_secs(DEFAULT_MAX_TTL_SECS),
            factor: DEFAULT_TTL_FACTOR,
            negative_ttl: Duration::from_secs(DEFAULT_NEGATIVE_TTL_SECS),
            max_cached_bytes: DEFAULT_MAX_CACHED_BYTES,
        }
    }
}

impl TtlPolicy {
    pub fn with_bounds(mut self, min_ttl: Duration, max_ttl: Duration) -> Self {
        self.min_ttl = min_ttl;
        self.max_ttl = max_ttl;
        self
    }

    pub fn with_negative_ttl(mut self, ttl: Duration) -> Self {
        self.negative_ttl = ttl;
        self
    }

    pub fn with_max_cached_bytes(mut self, bytes: usize) -> Self {
        self.max_cached_bytes = bytes;
        self
    }

    pub fn validate(&self) -> Result<(), TtlPolicyError> {
        if self.min_ttl > self.max_ttl {
            return Err(TtlPolicyError::MinAboveMax {
                min: self.min_ttl.as_secs(),
                max: self.max_ttl.as_secs(),
            });
        }
        if self.negative_ttl.is_zero() {
            return Err(TtlPolicyError::ZeroNegative);
        }
        if self.negative_ttl >= self.min_ttl {
            return Err(TtlPolicyError::NegativeNotShorter {
                negative: self.negative_ttl.as_secs(),
                min: self.min_ttl.as_secs(),
            });
        }
        if !self.factor.is_finite() || self.factor <= 0.0 {
            return Err(TtlPolicyError::BadFactor(self.factor));
        }
        Ok(())
    }

    /// TTL for a successful fetch.
    ///
    /// Without a modification time the content is treated as long-stable
    /// and gets `max_ttl`. Timestamps in the future count as just modified.
    pub fn positive_ttl(
        &self,
        last_modified: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Duration {
        let Some(modified) = last_modified else {
            return self.max_ttl;
        };
        let age_secs = (now - modified).num_seconds().max(0) as f64;
        let scaled = Duration::try_from_secs_f64(age_secs * self.factor).unwrap_or(self.max_ttl);
        scaled.max(self.min_ttl).min(self.max_ttl)
    }

    pub fn negative_ttl(&self) -> Duration {
        self.negative_ttl
    }

    pub fn is_cacheable_size(&self, len: usize) -> bool {
        len <= self.max_cached_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_default_policy_is_valid() {
        assert_eq!(TtlPolicy::default().validate(), Ok(()));
    }

    #[test]
    fn test_recent_content_gets_min_ttl() {
        let policy = TtlPolicy::default();
        let modified = now() - chrono::Duration::seconds(60);
        assert_eq!(policy.positive_ttl(Some(modified), now()), policy.min_ttl);
    }

    #[test]
    fn test_ttl_scales_with_age() {
        let policy = TtlPolicy::default();
        let modified = now() - chrono::Duration::seconds(10_000);
        assert_eq!(policy.positive_ttl(Some(modified), now()).as_secs(), 2_000);
    }

    #[test]
    fn test_old_content_approaches_ceiling() {
        let policy = TtlPolicy::default();
        let modified = now() - chrono::Duration::days(365);
        assert_eq!(policy.positive_ttl(Some(modified), now()), policy.max_ttl);
    }

    #[test]
    fn test_unknown_modification_time_uses_ceiling() {
        let policy = TtlPolicy::default();
        assert_eq!(policy.positive_ttl(None, now()), policy.max_ttl);
    }

    #[test]
    fn test_future_timestamp_counts_as_fresh() {
        let policy = TtlPolicy::default();
        let modified = now() + chrono::Duration::hours(1);
        assert_eq!(policy.positive_ttl(Some(modified), now()), policy.min_ttl);
    }

    #[test]
    fn test_negative_ttl_shorter_than_any_positive() {
        let policy = TtlPolicy::default();
        for age in [0i64, 1, 100, 10_000, 10_000_000] {
            let modified = now() - chrono::Duration::seconds(age);
            assert!(policy.negative_ttl() < policy.positive_ttl(Some(modified), now()));
        }
    }

    #[test]
    fn test_validate_rejects_long_negative_ttl() {
        let policy = TtlPolicy::default().with_negative_ttl(Duration::from_secs(30));
        assert!(matches!(
            policy.validate(),
            Err(TtlPolicyError::NegativeNotShorter { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_inverted_bounds() {
        let policy = TtlPolicy::default()
            .with_bounds(Duration::from_secs(100), Duration::from_secs(50));
        assert!(matches!(
            policy.validate(),
            Err(TtlPolicyError::MinAboveMax { .. })
        ));
    }

    #[test]
    fn test_size_cap() {
        let policy = TtlPolicy::default().with_max_cached_bytes(10);
        assert!(policy.is_cacheable_size(10));
        assert!(!policy.is_cacheable_size(11));
    }
}
