//! Query paths: in-core tables and memory-mapped FORMAT1 files.
//!
//! Every candidate is reported through a callback as it is found. A point can
//! be reported once per table it collides in; de-duplication and ranking are
//! left to the caller.

use crate::hash::HashKey;
use crate::index::LshIndex;
use crate::persistence::format1;
use crate::persistence::header::{MergeParams, SerialFormat, SerialHeader};
use crate::persistence::locking::LockType;
use crate::persistence::serial_file::{Access, SerialFile};
use crate::{LshError, Result};
use std::path::Path;

/// One candidate returned by a query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub point_id: u32,
    /// Position of the query within its query set.
    pub query_pos: u32,
    /// The index's nominal radius.
    pub radius: f32,
}

impl LshIndex {
    /// Report every point sharing a bucket with `v` in any in-core table.
    pub fn retrieve_point<F>(&self, v: &[f32], query_pos: u32, mut report: F) -> Result<()>
    where
        F: FnMut(Hit),
    {
        let keys = self.family.hash_keys(v)?;
        self.report_in_core(&keys, query_pos, &mut report);
        Ok(())
    }

    /// [`retrieve_point`](Self::retrieve_point) for each vector, with
    /// `query_pos` set to its position.
    pub fn retrieve_point_set<I, V, F>(&self, vectors: I, mut report: F) -> Result<()>
    where
        I: IntoIterator<Item = V>,
        V: AsRef<[f32]>,
        F: FnMut(Hit),
    {
        for (qpos, v) in vectors.into_iter().enumerate() {
            let keys = self.family.hash_keys(v.as_ref())?;
            self.report_in_core(&keys, qpos as u32, &mut report);
        }
        Ok(())
    }

    fn report_in_core(&self, keys: &[HashKey], query_pos: u32, report: &mut impl FnMut(Hit)) {
        let radius = self.params.radius;
        for (j, key) in keys.iter().enumerate() {
            if let Some(points) = self.store.lookup(j, key.t1, key.t2) {
                for &point_id in points {
                    report(Hit {
                        point_id,
                        query_pos,
                        radius,
                    });
                }
            }
        }
    }

    /// Query a FORMAT1 file directly through per-table mappings, without
    /// loading its tables.
    ///
    /// The file must have been built with this index's hash functions.
    pub fn serial_retrieve_point<F>(&self, path: impl AsRef<Path>, v: &[f32], query_pos: u32, report: F) -> Result<()>
    where
        F: FnMut(Hit),
    {
        let keys = self.family.hash_keys(v)?;
        self.report_serial(path.as_ref(), &[(query_pos, keys)], report)
    }

    /// Query a FORMAT1 file with a set of vectors, one table at a time.
    pub fn serial_retrieve_point_set<I, V, F>(&self, path: impl AsRef<Path>, vectors: I, report: F) -> Result<()>
    where
        I: IntoIterator<Item = V>,
        V: AsRef<[f32]>,
        F: FnMut(Hit),
    {
        let queries = vectors
            .into_iter()
            .enumerate()
            .map(|(qpos, v)| -> Result<(u32, Vec<HashKey>)> { Ok((qpos as u32, self.family.hash_keys(v.as_ref())?)) })
            .collect::<Result<Vec<_>>>()?;
        self.report_serial(path.as_ref(), &queries, report)
    }

    fn report_serial<F>(&self, path: &Path, queries: &[(u32, Vec<HashKey>)], mut report: F) -> Result<()>
    where
        F: FnMut(Hit),
    {
        let file = SerialFile::open(path, LockType::Shared, &self.lock_options)?;
        let header = file.read_header()?;
        if header.format() != SerialFormat::Format1 {
            return Err(LshError::Unsupported(format!(
                "serial retrieval needs a FORMAT1 file, {} is {}",
                path.display(),
                header.format()
            )));
        }
        self.check_compatible(&header, SerialFormat::Format1)?;

        let cols = header.num_cols as usize;
        let radius = header.radius;
        for j in 0..header.num_tables as usize {
            let table = file.map(header.table_offset(j), header.table_size(), Access::Random)?;
            for (query_pos, keys) in queries {
                let key = keys[j];
                for point_id in format1::lookup(&table, cols, key.t1, key.t2) {
                    report(Hit {
                        point_id,
                        query_pos: *query_pos,
                        radius,
                    });
                }
            }
        }
        Ok(())
    }

    /// Fail unless `header` describes a file built with this index's
    /// parameters and hash functions, in `format`.
    pub(crate) fn check_compatible(&self, header: &SerialHeader, format: SerialFormat) -> Result<()> {
        let disk = header.merge_params();
        let core = MergeParams::of(&self.params, format, self.seed());
        if core != disk {
            tracing::error!(diff = %core.diff(&disk), "incompatible core and serial LSH");
            return Err(LshError::Incompatible {
                core: Box::new(core),
                disk: Box::new(disk),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::LshParams;

    fn index() -> LshIndex {
        LshIndex::new(LshParams::new(1.0, 4, 3, 8).with_rows(1024, 10).with_radius(0.5).with_seed(23)).unwrap()
    }

    #[test]
    fn test_point_finds_itself_in_every_table() {
        let mut idx = index();
        let v: Vec<f32> = (0..8).map(|i| i as f32 * 0.25).collect();
        idx.insert_point(&v, 3).unwrap();

        let mut hits = Vec::new();
        idx.retrieve_point(&v, 9, |h| hits.push(h)).unwrap();
        assert_eq!(hits.len(), 3);
        for h in hits {
            assert_eq!(h.point_id, 3);
            assert_eq!(h.query_pos, 9);
            assert_eq!(h.radius, 0.5);
        }
    }

    #[test]
    fn test_empty_index_reports_nothing() {
        let idx = index();
        let mut n = 0;
        idx.retrieve_point(&[0.0; 8], 0, |_| n += 1).unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn test_point_set_positions() {
        let mut idx = index();
        let vs: Vec<Vec<f32>> = (0..4).map(|i| vec![i as f32 * 100.0; 8]).collect();
        idx.insert_point_set(&vs, 0).unwrap();

        let mut seen = Vec::new();
        idx.retrieve_point_set(&vs, |h| seen.push((h.query_pos, h.point_id))).unwrap();
        for q in 0..4u32 {
            assert!(seen.contains(&(q, q)), "query {q} missed itself");
        }
    }

    #[test]
    fn test_query_dimension_checked() {
        let idx = index();
        assert!(matches!(
            idx.retrieve_point(&[0.0; 3], 0, |_| {}),
            Err(LshError::DimensionMismatch { .. })
        ));
    }
}
