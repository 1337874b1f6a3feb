//! p-stable LSH function family.
//!
//! Each of the `L` table functions projects a vector onto `k` Gaussian
//! directions, adds a uniform bias in `[0, w)` and floors by the bin width:
//!
//! ```text
//! u[i] = floor((A[i] · v + b[i]) / w)
//! ```
//!
//! The integer vector `g = u` is then folded into two scalar keys with the
//! universal hash `sum(g[i] * r[i]) mod P`, where `P = 2^32 - 5`:
//!
//! - `t1 = fold(g, r1) mod N` selects the table row,
//! - `t2 = fold(g, r2)` identifies the bucket within the row.
//!
//! Because `t2 < P`, it never collides with the reserved `0xFFFFFFFC..=0xFFFFFFFF` range
//! used by the on-disk formats.

use super::random_projection::RandomProjector;
use crate::params::{HashComposition, LshParams};
use crate::{LshError, Result};

/// Universal-hash prime `2^32 - 5`.
pub const UH_PRIME_DEFAULT: u64 = 4_294_967_291;

const TWO_TO_32_MINUS_1: u64 = 0xFFFF_FFFF;

/// Computes `(a · b) mod UH_PRIME_DEFAULT` without overflowing 64 bits.
///
/// Uses `2^32 ≡ 5 (mod P)` to fold the high word back after every term.
#[inline]
pub fn product_mod_prime(a: &[u32], b: &[u32]) -> u32 {
    let mut h: u64 = 0;
    for (&x, &y) in a.iter().zip(b) {
        h += x as u64 * y as u64;
        h = (h & TWO_TO_32_MINUS_1) + 5 * (h >> 32);
        if h >= UH_PRIME_DEFAULT {
            h -= UH_PRIME_DEFAULT;
        }
        debug_assert!(h < UH_PRIME_DEFAULT);
    }
    h as u32
}

/// Row selector and bucket key for one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HashKey {
    pub t1: u32,
    pub t2: u32,
}

/// Quantized projections `g[L][k]` of one input vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projections {
    k: usize,
    g: Vec<u32>,
}

impl Projections {
    /// The `k` grid coordinates for table `j`.
    pub fn row(&self, j: usize) -> &[u32] {
        &self.g[j * self.k..(j + 1) * self.k]
    }

    pub fn num_tables(&self) -> usize {
        self.g.len() / self.k
    }
}

/// Shape of the stored coefficient arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FamilyShape {
    pub num_tables: usize,
    pub num_funs: usize,
    pub dim: usize,
    pub num_base_functions: usize,
    pub composition: HashComposition,
}

impl FamilyShape {
    pub fn of(params: &LshParams) -> Self {
        Self {
            num_tables: params.num_tables() as usize,
            num_funs: params.num_funs as usize,
            dim: params.dim as usize,
            num_base_functions: params.num_base_functions as usize,
            composition: params.composition,
        }
    }

    /// Number of projection sets stored (`m` for pairwise, `L` otherwise).
    pub fn projection_sets(&self) -> usize {
        match self.composition {
            HashComposition::Pairwise => self.num_base_functions,
            _ => self.num_tables,
        }
    }

    /// Projections per stored set (`k/2` for pairwise, `k` otherwise).
    pub fn projection_width(&self) -> usize {
        match self.composition {
            HashComposition::Pairwise => self.num_funs / 2,
            _ => self.num_funs,
        }
    }

    pub fn num_projections(&self) -> usize {
        self.projection_sets() * self.projection_width()
    }

    pub fn num_fold_coefficients(&self) -> usize {
        self.num_tables * self.num_funs
    }
}

/// The `L` hash functions of an index together with their fold coefficients.
#[derive(Debug, Clone)]
pub struct HashFunctionFamily {
    shape: FamilyShape,
    num_rows: u32,
    bin_width: f32,
    seed: u64,
    /// `A[set][i][d]`, flattened.
    projections: Vec<f32>,
    /// `b[set][i]`, flattened.
    biases: Vec<f32>,
    /// `r1[L][k]`, flattened.
    r1: Vec<u32>,
    /// `r2[L][k]`, flattened.
    r2: Vec<u32>,
}

impl HashFunctionFamily {
    /// Draw fresh coefficients. `params` must already be validated.
    pub fn new(params: &LshParams) -> Self {
        let mut rng = match params.seed {
            Some(seed) => RandomProjector::new(seed),
            None => RandomProjector::from_entropy(),
        };
        let shape = FamilyShape::of(params);
        let width = shape.projection_width();

        let mut projections = Vec::with_capacity(shape.num_projections() * shape.dim);
        let mut biases = Vec::with_capacity(shape.num_projections());
        for _ in 0..shape.projection_sets() {
            for _ in 0..width {
                projections.extend((0..shape.dim).map(|_| rng.randn()));
                biases.push(rng.ranf() * params.bin_width);
            }
        }

        let n = shape.num_fold_coefficients();
        let mut r1 = Vec::with_capacity(n);
        let mut r2 = Vec::with_capacity(n);
        for _ in 0..n {
            r1.push(rng.randr());
            r2.push(rng.randr());
        }

        Self {
            shape,
            num_rows: params.num_rows,
            bin_width: params.bin_width,
            seed: rng.seed(),
            projections,
            biases,
            r1,
            r2,
        }
    }

    /// Rebuild a family from stored coefficients.
    pub fn from_coefficients(
        params: &LshParams,
        seed: u64,
        projections: Vec<f32>,
        biases: Vec<f32>,
        r1: Vec<u32>,
        r2: Vec<u32>,
    ) -> Result<Self> {
        let shape = FamilyShape::of(params);
        let expect = |what: &str, got: usize, want: usize| {
            if got == want {
                Ok(())
            } else {
                Err(LshError::Format(format!(
                    "{what}: expected {want} coefficients, found {got}"
                )))
            }
        };
        expect("projections", projections.len(), shape.num_projections() * shape.dim)?;
        expect("biases", biases.len(), shape.num_projections())?;
        expect("r1", r1.len(), shape.num_fold_coefficients())?;
        expect("r2", r2.len(), shape.num_fold_coefficients())?;
        Ok(Self {
            shape,
            num_rows: params.num_rows,
            bin_width: params.bin_width,
            seed,
            projections,
            biases,
            r1,
            r2,
        })
    }

    pub fn shape(&self) -> FamilyShape {
        self.shape
    }

    pub fn num_tables(&self) -> usize {
        self.shape.num_tables
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn projections(&self) -> &[f32] {
        &self.projections
    }

    pub fn biases(&self) -> &[f32] {
        &self.biases
    }

    pub fn r1(&self) -> &[u32] {
        &self.r1
    }

    pub fn r2(&self) -> &[u32] {
        &self.r2
    }

    /// Quantize `v` against every projection set and assemble `g[L][k]`.
    pub fn compute_hash_functions(&self, v: &[f32]) -> Result<Projections> {
        let FamilyShape { dim, num_funs, .. } = self.shape;
        if v.len() != dim {
            return Err(LshError::DimensionMismatch {
                expected: dim,
                actual: v.len(),
            });
        }

        let iw = 1.0 / self.bin_width;
        let u: Vec<u32> = self
            .projections
            .chunks_exact(dim)
            .zip(&self.biases)
            .map(|(a, &b)| {
                let mut tmp = 0.0f64;
                for (&x, &y) in a.iter().zip(v) {
                    tmp += (x * y) as f64;
                }
                tmp += b as f64;
                tmp *= iw as f64;
                // Negative cells wrap into the upper half of u32.
                tmp.floor() as i64 as u32
            })
            .collect();

        let g = match self.shape.composition {
            HashComposition::Pairwise => {
                let half = self.shape.projection_width();
                let m = self.shape.num_base_functions;
                let mut g = Vec::with_capacity(self.shape.num_tables * num_funs);
                for a in 0..m.saturating_sub(1) {
                    for b in a + 1..m {
                        g.extend_from_slice(&u[a * half..(a + 1) * half]);
                        g.extend_from_slice(&u[b * half..(b + 1) * half]);
                    }
                }
                g
            }
            _ => u,
        };

        Ok(Projections { k: num_funs, g })
    }

    /// Fold the projections of table `j` into its `(t1, t2)` key.
    pub fn generate_hash_keys(&self, j: usize, g_row: &[u32]) -> HashKey {
        let k = self.shape.num_funs;
        let r1 = &self.r1[j * k..(j + 1) * k];
        let r2 = &self.r2[j * k..(j + 1) * k];
        HashKey {
            t1: product_mod_prime(g_row, r1) % self.num_rows,
            t2: product_mod_prime(g_row, r2),
        }
    }

    /// Keys for every table.
    pub fn hash_keys(&self, v: &[f32]) -> Result<Vec<HashKey>> {
        let g = self.compute_hash_functions(v)?;
        Ok((0..self.shape.num_tables)
            .map(|j| self.generate_hash_keys(j, g.row(j)))
            .collect())
    }
}
