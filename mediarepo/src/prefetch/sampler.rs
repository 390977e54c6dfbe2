//! Randomness for early-refresh decisions.
//!
//! The prefetcher draws from a [`RefreshSampler`] so tests can force the
//! refresh decision either way.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Source of uniform draws in `[0, 1)`.
pub trait RefreshSampler: Send {
    fn draw(&mut self) -> f64;
}

/// Sampler backed by a real RNG.
#[derive(Debug)]
pub struct RandomSampler {
    rng: StdRng,
}

impl RandomSampler {
    /// Seeded from the operating system.
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    /// Reproducible sequence.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl RefreshSampler for RandomSampler {
    fn draw(&mut self) -> f64 {
        self.rng.random::<f64>()
    }
}

/// Always returns the same value.
///
/// `FixedSampler(1.0)` never triggers a refresh; `FixedSampler(0.0)`
/// refreshes whenever the probability is above zero.
#[derive(Debug, Clone, Copy)]
pub struct FixedSampler(pub f64);

impl FixedSampler {
    pub fn never_refresh() -> Self {
        Self(1.0)
    }

    pub fn always_refresh() -> Self {
        Self(0.0)
    }
}

impl RefreshSampler for FixedSampler {
    fn draw(&mut self) -> f64 {
        self.0
    }
}
