//! Hashing layer: p-stable hash functions and the in-core bucket store.
//!
//! ## p-stable LSH
//!
//! For Euclidean distance, project onto Gaussian directions and quantize:
//!
//! ```text
//! h(v) = floor((a · v + b) / w)
//! ```
//!
//! Two points at distance `r` land in the same cell with a probability that
//! falls off smoothly with `r / w` (Datar et al. 2004). Concatenating `k`
//! such functions sharpens the falloff; using `L` independent concatenations
//! recovers recall.
//!
//! Each concatenation `g` is reduced to a row index `t1` and a bucket key
//! `t2` by universal hashing, and the point ID is filed under `(t1, t2)` in
//! its table.
//!
//! | Parameter | Effect |
//! |-----------|--------|
//! | `w` | larger cells, more collisions |
//! | `k` | fewer false positives, lower recall per table |
//! | `L` | more tables, higher recall, more memory |
//! | `N` | more rows, shorter rows |
//! | `C` | more keys kept per row |

pub mod family;
pub mod hash_table;
pub mod random_projection;

pub use family::{product_mod_prime, FamilyShape, HashFunctionFamily, HashKey, Projections, UH_PRIME_DEFAULT};
pub use hash_table::{Bucket, BucketChainStore, InsertOutcome, Row, StoreStats};
pub use random_projection::RandomProjector;
