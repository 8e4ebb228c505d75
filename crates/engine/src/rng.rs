//! Deterministic random number generation
//!
//! Seeded initial conditions must be reproducible across platforms, so all
//! randomness comes from a SplitMix64 stream rather than an OS-seeded
//! generator. Same seed, same sequence.

use std::f64::consts::PI;

/// A deterministic pseudo-random number stream.
///
/// Each generation call advances the stream state; streams never reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RngStream {
    state: u64,
}

impl RngStream {
    /// Create a new stream from a seed.
    #[inline]
    pub const fn new(seed: u64) -> Self {
        // SplitMix64 requires a non-zero state
        let state = if seed == 0 { 0x9E3779B97F4A7C15 } else { seed };
        Self { state }
    }

    /// Derive an independent substream for run `index` of an ensemble.
    #[inline]
    pub fn for_run(&self, index: u64) -> Self {
        Self::new(splitmix64_mix(self.state ^ index))
    }

    /// Next random u64.
    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E3779B97F4A7C15);
        splitmix64_mix(self.state)
    }

    /// Uniform f64 in [0, 1).
    #[inline]
    pub fn uniform(&mut self) -> f64 {
        // Upper 53 bits for full mantissa precision
        (self.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Standard normal value via Box-Muller.
    #[inline]
    pub fn normal(&mut self) -> f64 {
        let u1 = self.uniform();
        let u2 = self.uniform();
        let u1 = if u1 == 0.0 { f64::MIN_POSITIVE } else { u1 };
        (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
    }
}

/// Reproducible random initial state: `dim` components drawn from
/// N(0, scale).
pub fn random_initial_state(dim: usize, scale: f64, seed: u64) -> Vec<f64> {
    let mut rng = RngStream::new(seed);
    (0..dim).map(|_| rng.normal() * scale).collect()
}

#[inline]
const fn splitmix64_mix(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}
