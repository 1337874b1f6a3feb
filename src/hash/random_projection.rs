//! Seeded random source for hash-function coefficients.

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};

/// Generates the Gaussian projections, uniform biases and integer fold
/// coefficients of a hash-function family.
///
/// One projector is created per family and seeded exactly once, so a family
/// built from the same seed and parameters always has the same coefficients.
pub struct RandomProjector {
    rng: StdRng,
    seed: u64,
}

impl RandomProjector {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            seed,
        }
    }

    /// Seed from OS entropy. The chosen seed is still available via [`seed`](Self::seed).
    pub fn from_entropy() -> Self {
        Self::new(rand::rng().random())
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Uniform in `[0, 1)`.
    pub fn ranf(&mut self) -> f32 {
        self.rng.random::<f32>()
    }

    /// Standard normal via Box-Muller.
    pub fn randn(&mut self) -> f32 {
        let mut x1 = self.ranf();
        while x1 == 0.0 {
            x1 = self.ranf();
        }
        let x2 = self.ranf();
        (-2.0 * x1.ln()).sqrt() * (2.0 * std::f32::consts::PI * x2).cos()
    }

    /// Integer fold coefficient in `[1, 2^29]`.
    pub fn randr(&mut self) -> u32 {
        (self.rng.next_u32() >> 3) + 1
    }
}
