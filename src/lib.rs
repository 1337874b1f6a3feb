//! lshdb: disk-backed locality-sensitive hashing for dense feature vectors.
//!
//! Points are `d`-dimensional `f32` vectors with caller-assigned, strictly
//! increasing `u32` IDs. Each point is hashed by `L` p-stable hash functions
//! into `L` tables; a query reports every point that shares a bucket with it
//! in any table.
//!
//! - [`hash`]: hash-function family and in-core bucket store
//! - [`persistence`]: on-disk header, FORMAT1/FORMAT2 tables, locking
//! - [`LshIndex`]: insertion, retrieval, serialization
//!
//! # Choosing Parameters
//!
//! `w` should be on the order of the distances you want to find. Start with
//! `k` around 10 and raise `m` until recall is acceptable; the table count
//! grows as `m(m-1)/2`. `N` should be comparable to the number of points so
//! rows stay short, and `C` bounds how many distinct keys a crowded row keeps.
//!
//! # Example
//!
//! ```no_run
//! use lshdb::{LoadMode, LshIndex, LshParams, SerialFormat};
//!
//! let mut index = LshIndex::new(LshParams::new(1.0, 4, 3, 8).with_rows(1024, 10))?;
//! index.insert_point(&[0.5; 8], 0)?;
//! index.serialize("features.lsh", SerialFormat::Format1)?;
//!
//! let on_disk = LshIndex::open("features.lsh", LoadMode::FunctionsOnly)?;
//! on_disk.serial_retrieve_point("features.lsh", &[0.5; 8], 0, |hit| {
//!     println!("candidate {}", hit.point_id);
//! })?;
//! # Ok::<(), lshdb::LshError>(())
//! ```

pub mod error;
pub mod hash;
pub mod index;
pub mod params;
pub mod persistence;
pub mod retrieval;

pub use error::{LshError, Result};
pub use hash::{HashFunctionFamily, HashKey, StoreStats};
pub use index::{LoadMode, LshIndex};
pub use params::{HashComposition, LshParams};
pub use persistence::{dump_tables, LockOptions, SerialFormat};
pub use retrieval::Hit;
