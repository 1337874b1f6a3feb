//! The LSH index: a hash-function family plus its in-core tables.

use crate::hash::{BucketChainStore, HashFunctionFamily, StoreStats};
use crate::params::LshParams;
use crate::persistence::format2::RESERVED_MIN;
use crate::persistence::locking::LockOptions;
use crate::{LshError, Result};

/// How much of a serialized index [`LshIndex::open`] brings into memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadMode {
    /// Header, hash functions and every table.
    #[default]
    InCore,
    /// Header and hash functions only. Queries go to the file through
    /// [`LshIndex::serial_retrieve_point`]; new points can be inserted and
    /// merged back with [`LshIndex::serialize`].
    FunctionsOnly,
}

/// Locality-sensitive hashing index over fixed-dimension `f32` vectors.
///
/// Points are identified by caller-assigned `u32` IDs that must be inserted
/// in strictly ascending order.
///
/// # Example
///
/// ```no_run
/// use lshdb::{LshIndex, LshParams};
///
/// let params = LshParams::new(1.0, 4, 3, 8).with_rows(1024, 10).with_seed(7);
/// let mut index = LshIndex::new(params)?;
/// index.insert_point(&[0.0; 8], 0)?;
///
/// let mut hits = Vec::new();
/// index.retrieve_point(&[0.0; 8], 0, |hit| hits.push(hit.point_id))?;
/// assert!(hits.contains(&0));
/// # Ok::<(), lshdb::LshError>(())
/// ```
#[derive(Debug, Clone)]
pub struct LshIndex {
    pub(crate) params: LshParams,
    pub(crate) family: HashFunctionFamily,
    pub(crate) store: BucketChainStore,
    pub(crate) max_point: Option<u32>,
    pub(crate) lock_options: LockOptions,
}

impl LshIndex {
    /// Build an empty index, drawing hash functions from `params.seed` (or
    /// from entropy when unset).
    pub fn new(params: LshParams) -> Result<Self> {
        let mut params = params.validate()?;
        let family = HashFunctionFamily::new(&params);
        params.seed = Some(family.seed());
        let store = BucketChainStore::new(
            family.num_tables(),
            params.num_rows,
            params.max_collisions,
            params.block_full_rows,
        );
        tracing::debug!(
            w = params.bin_width,
            k = params.num_funs,
            m = params.num_base_functions,
            L = family.num_tables(),
            d = params.dim,
            N = params.num_rows,
            C = params.max_collisions,
            seed = family.seed(),
            "created LSH index"
        );
        Ok(Self {
            params,
            family,
            store,
            max_point: None,
            lock_options: LockOptions::default(),
        })
    }

    pub(crate) fn from_parts(
        params: LshParams,
        family: HashFunctionFamily,
        store: BucketChainStore,
        max_point: Option<u32>,
        lock_options: LockOptions,
    ) -> Self {
        Self {
            params,
            family,
            store,
            max_point,
            lock_options,
        }
    }

    /// Use `opts` for every file this index locks from now on.
    pub fn with_lock_options(mut self, opts: LockOptions) -> Self {
        self.lock_options = opts;
        self
    }

    pub fn set_lock_options(&mut self, opts: LockOptions) {
        self.lock_options = opts;
    }

    pub fn lock_options(&self) -> &LockOptions {
        &self.lock_options
    }

    /// Parameters after validation, with the seed filled in.
    pub fn params(&self) -> &LshParams {
        &self.params
    }

    pub fn seed(&self) -> u64 {
        self.family.seed()
    }

    pub fn num_tables(&self) -> usize {
        self.family.num_tables()
    }

    pub fn dim(&self) -> usize {
        self.params.dim as usize
    }

    pub fn radius(&self) -> f32 {
        self.params.radius
    }

    /// Highest point ID inserted so far.
    pub fn max_point(&self) -> Option<u32> {
        self.max_point
    }

    pub fn stats(&self) -> StoreStats {
        self.store.stats()
    }

    pub fn family(&self) -> &HashFunctionFamily {
        &self.family
    }

    pub fn store(&self) -> &BucketChainStore {
        &self.store
    }

    /// Index `v` under `point_id` in every table.
    ///
    /// Returns the sum over tables of the entries in the row the point landed
    /// in, a rough measure of how crowded its rows are. Rows that are already
    /// full count but do not take the point.
    pub fn insert_point(&mut self, v: &[f32], point_id: u32) -> Result<u32> {
        if point_id >= RESERVED_MIN {
            return Err(LshError::InvalidPointId(point_id));
        }
        if let Some(max_point) = self.max_point {
            if point_id <= max_point {
                return Err(LshError::OrderingViolation { point_id, max_point });
            }
        }
        let keys = self.family.hash_keys(v)?;
        self.max_point = Some(point_id);

        let mut collisions = 0u32;
        for (j, key) in keys.iter().enumerate() {
            let outcome = self.store.insert(j, key.t1, key.t2, point_id);
            collisions += outcome.collision_count;
        }
        Ok(collisions)
    }

    /// Insert `vectors` with consecutive IDs starting at `base_id`.
    ///
    /// Stops at the first failing vector; the ones before it stay indexed.
    pub fn insert_point_set<I, V>(&mut self, vectors: I, base_id: u32) -> Result<()>
    where
        I: IntoIterator<Item = V>,
        V: AsRef<[f32]>,
    {
        let mut id = base_id;
        let mut inserted = 0u64;
        for v in vectors {
            self.insert_point(v.as_ref(), id)?;
            inserted += 1;
            id = match id.checked_add(1) {
                Some(next) => next,
                None => break,
            };
        }
        tracing::debug!(inserted, base_id, "inserted point set");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> LshIndex {
        LshIndex::new(LshParams::new(1.0, 4, 3, 8).with_rows(1024, 10).with_seed(17)).unwrap()
    }

    #[test]
    fn test_seed_recorded() {
        let idx = LshIndex::new(LshParams::new(1.0, 4, 3, 8)).unwrap();
        assert_eq!(idx.params().seed, Some(idx.seed()));
    }

    #[test]
    fn test_insert_reports_collisions() {
        let mut idx = index();
        let c = idx.insert_point(&[0.1; 8], 0).unwrap();
        assert_eq!(c, 3);
        assert_eq!(idx.max_point(), Some(0));
        assert_eq!(idx.stats().point_count, 3);
    }

    #[test]
    fn test_ordering_enforced() {
        let mut idx = index();
        idx.insert_point(&[0.0; 8], 5).unwrap();
        let err = idx.insert_point(&[0.0; 8], 5).unwrap_err();
        assert!(matches!(
            err,
            LshError::OrderingViolation {
                point_id: 5,
                max_point: 5
            }
        ));
        assert!(idx.insert_point(&[0.0; 8], 3).is_err());
        idx.insert_point(&[0.0; 8], 6).unwrap();
    }

    #[test]
    fn test_reserved_ids_rejected() {
        let mut idx = index();
        for id in [0xFFFF_FFFC, 0xFFFF_FFFD, 0xFFFF_FFFE, 0xFFFF_FFFF] {
            assert!(matches!(idx.insert_point(&[0.0; 8], id), Err(LshError::InvalidPointId(_))));
        }
        assert_eq!(idx.max_point(), None);
    }

    #[test]
    fn test_bad_dimension_leaves_state_untouched() {
        let mut idx = index();
        assert!(idx.insert_point(&[0.0; 7], 0).is_err());
        assert_eq!(idx.max_point(), None);
        idx.insert_point(&[0.0; 8], 0).unwrap();
    }

    #[test]
    fn test_insert_point_set_assigns_consecutive_ids() {
        let mut idx = index();
        let vs: Vec<Vec<f32>> = (0..5).map(|i| vec![i as f32; 8]).collect();
        idx.insert_point_set(&vs, 10).unwrap();
        assert_eq!(idx.max_point(), Some(14));
        assert!(idx.insert_point_set(&vs, 12).is_err());
    }
}
