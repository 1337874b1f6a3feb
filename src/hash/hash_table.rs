//! Two-level bucket store for LSH tables.
//!
//! Every table has `N` rows addressed by `t1`. A row holds buckets keyed by
//! `t2`, in insertion order, and each bucket holds the point IDs that hashed
//! to it, also in insertion order. Retrieval takes the first bucket whose key
//! matches, so order is part of the contract.
//!
//! With row blocking enabled, a row admits at most `C` point entries, the
//! number of slots a FORMAT1 row has on disk. Entries arriving after that are
//! kept on the row's overflow list, counted, and never returned by lookups or
//! written to disk. The number of distinct keys in a row is tracked
//! alongside as a measure of how crowded it is.

use smallvec::SmallVec;
use std::fmt;

/// A bucket: one `t2` key and the points that share it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    t2: u32,
    points: SmallVec<[u32; 4]>,
}

impl Bucket {
    fn new(t2: u32, point_id: u32) -> Self {
        let mut points = SmallVec::new();
        points.push(point_id);
        Self { t2, points }
    }

    pub fn t2(&self) -> u32 {
        self.t2
    }

    pub fn points(&self) -> &[u32] {
        &self.points
    }

    /// Returns false if the point was already present.
    fn push(&mut self, point_id: u32) -> bool {
        if self.points.contains(&point_id) {
            return false;
        }
        self.points.push(point_id);
        true
    }
}

/// One row of a table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    buckets: Vec<Bucket>,
    overflow: Vec<Bucket>,
    entries: u32,
    saturated: bool,
}

impl Row {
    /// Retrievable buckets, in insertion order.
    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    /// Entries refused once the row reached its cap, grouped by key.
    pub fn overflow(&self) -> &[Bucket] {
        &self.overflow
    }

    pub fn is_saturated(&self) -> bool {
        self.saturated
    }

    /// Point entries admitted to the row.
    pub fn collision_count(&self) -> u32 {
        self.entries
    }

    /// Distinct keys admitted to the row.
    pub fn distinct_keys(&self) -> u32 {
        self.buckets.len() as u32
    }

    pub fn find(&self, t2: u32) -> Option<&Bucket> {
        self.buckets.iter().find(|b| b.t2 == t2)
    }
}

impl Row {
    fn outcome(&self, admitted: bool) -> InsertOutcome {
        InsertOutcome {
            collision_count: self.entries,
            distinct_keys: self.distinct_keys(),
            admitted,
        }
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for bucket in &self.buckets {
            for p in &bucket.points {
                write!(f, "({:X},{})", bucket.t2, p)?;
            }
        }
        Ok(())
    }
}

/// Counters over the whole store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Distinct buckets created across all tables.
    pub bucket_count: u64,
    /// Point entries stored across all tables.
    pub point_count: u64,
    /// Rows that refused at least one entry.
    pub saturated_rows: u64,
    /// Entries parked on overflow lists.
    pub overflow_entries: u64,
}

/// What happened to a single insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertOutcome {
    /// Entries in the row after the insertion.
    pub collision_count: u32,
    /// Distinct keys in the row after the insertion.
    pub distinct_keys: u32,
    /// The point landed in a retrievable bucket.
    pub admitted: bool,
}

/// `L` tables of `N` rows.
#[derive(Debug, Clone)]
pub struct BucketChainStore {
    num_rows: u32,
    max_collisions: u32,
    block_full_rows: bool,
    tables: Vec<Vec<Option<Box<Row>>>>,
    stats: StoreStats,
}

impl BucketChainStore {
    pub fn new(num_tables: usize, num_rows: u32, max_collisions: u32, block_full_rows: bool) -> Self {
        Self {
            num_rows,
            max_collisions,
            block_full_rows,
            tables: (0..num_tables)
                .map(|_| (0..num_rows).map(|_| None).collect())
                .collect(),
            stats: StoreStats::default(),
        }
    }

    pub fn num_tables(&self) -> usize {
        self.tables.len()
    }

    pub fn num_rows(&self) -> u32 {
        self.num_rows
    }

    pub fn max_collisions(&self) -> u32 {
        self.max_collisions
    }

    pub fn stats(&self) -> StoreStats {
        self.stats
    }

    pub fn is_empty(&self) -> bool {
        self.stats.point_count == 0
    }

    /// Add `point_id` under key `(t1, t2)` of table `table`.
    ///
    /// # Panics
    ///
    /// If `table` or `t1` is out of range; keys produced by the index's own
    /// hash family never are.
    pub fn insert(&mut self, table: usize, t1: u32, t2: u32, point_id: u32) -> InsertOutcome {
        let row = self.tables[table][t1 as usize].get_or_insert_with(Box::default);
        let existing = row.buckets.iter().position(|b| b.t2 == t2);

        if existing.is_some_and(|i| row.buckets[i].points.contains(&point_id)) {
            return row.outcome(true);
        }

        if self.block_full_rows && row.entries >= self.max_collisions {
            if !row.saturated {
                row.saturated = true;
                self.stats.saturated_rows += 1;
                tracing::warn!(table, row = t1, cap = self.max_collisions, "row saturated, further entries overflow");
            }
            let added = match row.overflow.iter_mut().find(|b| b.t2 == t2) {
                Some(bucket) => bucket.push(point_id),
                None => {
                    row.overflow.push(Bucket::new(t2, point_id));
                    true
                }
            };
            if added {
                self.stats.overflow_entries += 1;
            }
            return row.outcome(false);
        }

        match existing {
            Some(i) => {
                row.buckets[i].points.push(point_id);
            }
            None => {
                row.buckets.push(Bucket::new(t2, point_id));
                self.stats.bucket_count += 1;
            }
        }
        row.entries += 1;
        self.stats.point_count += 1;
        row.outcome(true)
    }

    /// First row holding more than `cols` entries, as `(table, row, entries)`.
    ///
    /// Only rows of a store built without row blocking can exceed the cap.
    pub fn overfull_row(&self, cols: u32) -> Option<(usize, u32, u32)> {
        (0..self.num_tables()).find_map(|j| {
            self.rows(j)
                .find(|(_, row)| row.entries > cols)
                .map(|(y, row)| (j, y, row.entries))
        })
    }

    pub fn row(&self, table: usize, t1: u32) -> Option<&Row> {
        self.tables
            .get(table)?
            .get(t1 as usize)?
            .as_deref()
    }

    /// Points stored under `(t1, t2)` in `table`.
    pub fn lookup(&self, table: usize, t1: u32, t2: u32) -> Option<&[u32]> {
        self.row(table, t1)?.find(t2).map(Bucket::points)
    }

    /// Insert every retrievable entry of `other` after this store's own.
    pub fn absorb(&mut self, other: &BucketChainStore) {
        for j in 0..other.num_tables().min(self.num_tables()) {
            for (y, row) in other.rows(j) {
                for bucket in &row.buckets {
                    for &p in &bucket.points {
                        self.insert(j, y, bucket.t2, p);
                    }
                }
            }
        }
    }

    /// Non-empty rows of `table` in ascending row order.
    pub fn rows(&self, table: usize) -> impl Iterator<Item = (u32, &Row)> + '_ {
        self.tables[table]
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.as_deref().map(|r| (i as u32, r)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_lookup() {
        let mut s = BucketChainStore::new(2, 16, 10, true);
        s.insert(0, 3, 100, 1);
        s.insert(0, 3, 100, 2);
        s.insert(0, 3, 200, 3);
        s.insert(1, 3, 100, 4);

        assert_eq!(s.lookup(0, 3, 100), Some(&[1, 2][..]));
        assert_eq!(s.lookup(0, 3, 200), Some(&[3][..]));
        assert_eq!(s.lookup(1, 3, 100), Some(&[4][..]));
        assert_eq!(s.lookup(0, 4, 100), None);
        assert_eq!(s.lookup(0, 3, 300), None);

        let stats = s.stats();
        assert_eq!(stats.bucket_count, 3);
        assert_eq!(stats.point_count, 4);
    }

    #[test]
    fn test_duplicate_point_is_absorbed() {
        let mut s = BucketChainStore::new(1, 4, 10, true);
        s.insert(0, 0, 7, 1);
        let out = s.insert(0, 0, 7, 1);
        assert!(out.admitted);
        assert_eq!(s.lookup(0, 0, 7), Some(&[1][..]));
        assert_eq!(s.stats().point_count, 1);
    }

    #[test]
    fn test_cap_counts_entries_not_keys() {
        let cap = 3;
        let mut s = BucketChainStore::new(1, 4, cap, true);
        assert_eq!(s.insert(0, 1, 1000, 0).collision_count, 1);
        assert_eq!(s.insert(0, 1, 1000, 1).distinct_keys, 1);
        let third = s.insert(0, 1, 2000, 2);
        assert_eq!((third.collision_count, third.distinct_keys), (3, 2));

        // Full: neither a new key nor a new point under an old key gets in.
        let refused = s.insert(0, 1, 3000, 3);
        assert!(!refused.admitted);
        assert_eq!(refused.collision_count, cap);
        assert!(!s.insert(0, 1, 1000, 4).admitted);
        assert_eq!(s.lookup(0, 1, 1000), Some(&[0, 1][..]));
        assert_eq!(s.lookup(0, 1, 3000), None);

        let row = s.row(0, 1).unwrap();
        assert!(row.is_saturated());
        assert_eq!(row.overflow().len(), 2);
        assert_eq!(s.stats().saturated_rows, 1);
        assert_eq!(s.stats().overflow_entries, 2);
        assert_eq!(s.stats().point_count, 3);

        // Re-inserting a stored pair is still absorbed.
        assert!(s.insert(0, 1, 2000, 2).admitted);
        assert_eq!(s.overfull_row(cap), None);
    }

    #[test]
    fn test_unblocked_rows_grow() {
        let mut s = BucketChainStore::new(1, 4, 2, false);
        for key in 0..10 {
            assert!(s.insert(0, 0, key, key).admitted);
        }
        assert_eq!(s.row(0, 0).unwrap().collision_count(), 10);
        assert_eq!(s.row(0, 0).unwrap().distinct_keys(), 10);
        assert_eq!(s.stats().saturated_rows, 0);
        assert_eq!(s.overfull_row(2), Some((0, 0, 10)));
    }

    #[test]
    fn test_rows_ascending() {
        let mut s = BucketChainStore::new(1, 8, 4, true);
        s.insert(0, 5, 1, 1);
        s.insert(0, 2, 1, 2);
        s.insert(0, 7, 1, 3);
        let rows: Vec<u32> = s.rows(0).map(|(i, _)| i).collect();
        assert_eq!(rows, vec![2, 5, 7]);
    }

    #[test]
    fn test_absorb_keeps_existing_order() {
        let mut a = BucketChainStore::new(1, 4, 4, true);
        a.insert(0, 0, 5, 1);
        let mut b = BucketChainStore::new(1, 4, 4, true);
        b.insert(0, 0, 5, 2);
        b.insert(0, 0, 5, 1);
        b.insert(0, 3, 9, 3);
        a.absorb(&b);
        assert_eq!(a.lookup(0, 0, 5), Some(&[1, 2][..]));
        assert_eq!(a.lookup(0, 3, 9), Some(&[3][..]));
        assert_eq!(a.stats().point_count, 3);
    }

    #[test]
    fn test_row_display() {
        let mut s = BucketChainStore::new(1, 2, 4, true);
        s.insert(0, 0, 0xAB, 1);
        s.insert(0, 0, 0xAB, 2);
        s.insert(0, 0, 0x10, 3);
        assert_eq!(s.row(0, 0).unwrap().to_string(), "(AB,1)(AB,2)(10,3)");
    }
}
