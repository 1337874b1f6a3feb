//! Construction parameters for an LSH index.
//!
//! Parameters are fixed for the lifetime of an index: they determine the
//! shape of the hash-function coefficients and of the on-disk tables, and two
//! indexes can only be merged when they agree on them.

use crate::{LshError, Result};
use serde::{Deserialize, Serialize};

/// How the `L` table hash functions are assembled from random projections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HashComposition {
    /// `L = m(m-1)/2` independent functions, each with `k` projections.
    #[default]
    Independent,
    /// `L = m(m-1)/2` functions, each the concatenation of two of `m`
    /// half-width base functions (`k/2` projections each). Stores fewer
    /// coefficients at the cost of correlated tables.
    Pairwise,
    /// `L = m` independent functions.
    Direct,
}

impl HashComposition {
    /// Number of hash tables produced from `m` base functions. Saturates at
    /// `u32::MAX`; see [`checked_num_tables`](Self::checked_num_tables).
    pub fn num_tables(self, m: u32) -> u32 {
        self.checked_num_tables(m).unwrap_or(u32::MAX)
    }

    /// Number of hash tables produced from `m` base functions, or `None` on overflow.
    pub fn checked_num_tables(self, m: u32) -> Option<u32> {
        match self {
            Self::Independent | Self::Pairwise => {
                let pairs = (m as u64) * (m as u64).saturating_sub(1) / 2;
                u32::try_from(pairs).ok()
            }
            Self::Direct => Some(m),
        }
    }

    /// Smallest usable `m`.
    pub fn min_base_functions(self) -> u32 {
        match self {
            Self::Direct => 1,
            _ => 2,
        }
    }

    pub(crate) fn flag(self) -> u32 {
        match self {
            Self::Independent => 0,
            Self::Pairwise => crate::persistence::header::FLAG_PAIRWISE,
            Self::Direct => crate::persistence::header::FLAG_DIRECT,
        }
    }

    pub(crate) fn from_flags(flags: u32) -> Self {
        use crate::persistence::header::{FLAG_DIRECT, FLAG_PAIRWISE};
        if flags & FLAG_PAIRWISE != 0 {
            Self::Pairwise
        } else if flags & FLAG_DIRECT != 0 {
            Self::Direct
        } else {
            Self::Independent
        }
    }
}

/// LSH index parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LshParams {
    /// Quantization bin width `w`.
    pub bin_width: f32,
    /// Projections per hash function `k`.
    pub num_funs: u32,
    /// Base random functions `m`.
    pub num_base_functions: u32,
    /// Input vector dimensionality `d`.
    pub dim: u32,
    /// Rows per hash table `N`.
    pub num_rows: u32,
    /// Maximum distinct keys per row `C`.
    pub max_collisions: u32,
    /// Nominal search radius, reported with every hit.
    pub radius: f32,
    /// Table hash-function composition strategy.
    pub composition: HashComposition,
    /// Cap the number of distinct keys per row at `max_collisions`.
    pub block_full_rows: bool,
    /// RNG seed; drawn from entropy when absent and recorded in the header.
    pub seed: Option<u64>,
}

impl Default for LshParams {
    fn default() -> Self {
        Self {
            bin_width: 4.0,
            num_funs: 10,
            num_base_functions: 5,
            dim: 12,
            num_rows: 100_000,
            max_collisions: 100,
            radius: 0.0,
            composition: HashComposition::Independent,
            block_full_rows: true,
            seed: None,
        }
    }
}

impl LshParams {
    pub fn new(bin_width: f32, num_funs: u32, num_base_functions: u32, dim: u32) -> Self {
        Self {
            bin_width,
            num_funs,
            num_base_functions,
            dim,
            ..Self::default()
        }
    }

    pub fn with_rows(mut self, num_rows: u32, max_collisions: u32) -> Self {
        self.num_rows = num_rows;
        self.max_collisions = max_collisions;
        self
    }

    pub fn with_radius(mut self, radius: f32) -> Self {
        self.radius = radius;
        self
    }

    pub fn with_composition(mut self, composition: HashComposition) -> Self {
        self.composition = composition;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Number of hash tables `L`.
    pub fn num_tables(&self) -> u32 {
        self.composition.num_tables(self.num_base_functions)
    }

    /// Check parameters, clamping `m` and `k` where the index can still be built.
    pub fn validate(mut self) -> Result<Self> {
        if !(self.bin_width.is_finite() && self.bin_width > 0.0) {
            return Err(LshError::InvalidConfig(format!(
                "bin width must be positive, got {}",
                self.bin_width
            )));
        }
        if !(self.radius.is_finite() && self.radius >= 0.0) {
            return Err(LshError::InvalidConfig(format!(
                "radius must be finite and non-negative, got {}",
                self.radius
            )));
        }
        for (name, value) in [
            ("num_funs", self.num_funs),
            ("dim", self.dim),
            ("num_rows", self.num_rows),
            ("max_collisions", self.max_collisions),
        ] {
            if value == 0 {
                return Err(LshError::InvalidConfig(format!("{name} must be positive")));
            }
        }
        let min_m = self.composition.min_base_functions();
        if self.num_base_functions < min_m {
            tracing::warn!(
                m = self.num_base_functions,
                "setting m={min_m}, L={}",
                self.composition.num_tables(min_m)
            );
            self.num_base_functions = min_m;
        }
        if self.composition == HashComposition::Pairwise && self.num_funs % 2 == 1 {
            tracing::warn!(k = self.num_funs, "pairwise composition needs even k, setting k={}", self.num_funs + 1);
            self.num_funs += 1;
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_counts() {
        assert_eq!(HashComposition::Independent.num_tables(3), 3);
        assert_eq!(HashComposition::Independent.num_tables(5), 10);
        assert_eq!(HashComposition::Pairwise.num_tables(4), 6);
        assert_eq!(HashComposition::Direct.num_tables(7), 7);
    }

    #[test]
    fn test_table_count_never_overflows() {
        assert_eq!(HashComposition::Independent.num_tables(0), 0);
        assert_eq!(LshParams::new(1.0, 4, 0, 8).num_tables(), 0);
        assert_eq!(HashComposition::Pairwise.checked_num_tables(100_000), None);
        assert_eq!(HashComposition::Pairwise.num_tables(100_000), u32::MAX);
        assert_eq!(HashComposition::Independent.checked_num_tables(65_536), Some(2_147_450_880));
    }

    #[test]
    fn test_validate_clamps_m() {
        let p = LshParams::new(1.0, 4, 1, 8).validate().unwrap();
        assert_eq!(p.num_base_functions, 2);
        assert_eq!(p.num_tables(), 1);
    }

    #[test]
    fn test_validate_evens_k_for_pairwise() {
        let p = LshParams::new(1.0, 5, 3, 8)
            .with_composition(HashComposition::Pairwise)
            .validate()
            .unwrap();
        assert_eq!(p.num_funs, 6);
    }

    #[test]
    fn test_validate_rejects_zero_width() {
        let err = LshParams::new(0.0, 4, 3, 8).validate().unwrap_err();
        assert!(matches!(err, LshError::InvalidConfig(_)));
    }

    #[test]
    fn test_validate_rejects_zero_dim() {
        assert!(LshParams::new(1.0, 4, 3, 0).validate().is_err());
    }

    #[test]
    fn test_json_config() {
        let p = LshParams::new(0.5, 8, 4, 20)
            .with_rows(4096, 32)
            .with_composition(HashComposition::Direct)
            .with_seed(9);
        let json = serde_json::to_string(&p).unwrap();
        let back: LshParams = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
    }
}
