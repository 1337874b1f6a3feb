//! Serialize, merge and reopen whole indexes.

use super::header::{SerialFormat, SerialHeader};
use super::locking::{LockOptions, LockType};
use super::serial_file::SerialFile;
use super::{format1, format2, functions};
use crate::hash::BucketChainStore;
use crate::index::{LoadMode, LshIndex};
use crate::{LshError, Result};
use std::io::Write;
use std::path::Path;

impl LshIndex {
    /// Write the index to `path`.
    ///
    /// A missing file is created in `format`. An existing file is merged into:
    /// its header must match this index (parameters, seed, composition and
    /// `format`) or [`LshError::Incompatible`] is returned and the file is left
    /// untouched.
    ///
    /// FORMAT1 rows have `C` slots, so an index built without row blocking
    /// whose rows grew past `C` is refused with [`LshError::Capacity`].
    pub fn serialize(&self, path: impl AsRef<Path>, format: SerialFormat) -> Result<()> {
        let path = path.as_ref();
        if format == SerialFormat::Format1 {
            if let Some((table, row, entries)) = self.store.overfull_row(self.params.max_collisions) {
                return Err(LshError::Capacity(format!(
                    "table {table} row {row} holds {entries} entries, FORMAT1 rows have {} slots",
                    self.params.max_collisions
                )));
            }
        }
        let stats = self.store.stats();
        let header = SerialHeader::new(&self.params, format, self.seed(), self.max_point, stats.point_count);

        match SerialFile::create(path, &header, &self.lock_options) {
            Ok(file) => self.write_new(&file, &header),
            Err(LshError::Io(e)) if e.kind() == std::io::ErrorKind::AlreadyExists => self.merge_into(path, format),
            Err(e) => Err(e),
        }
    }

    fn write_new(&self, file: &SerialFile, header: &SerialHeader) -> Result<()> {
        functions::write(file, header, &self.family)?;
        let entries = match header.format() {
            SerialFormat::Format1 => format1::write_tables(file, header, &self.store, false)?,
            SerialFormat::Format2 => {
                let mut w = file.writer_at(header.hashtable_offset())?;
                format2::write_tables(&mut w, &self.store)?
            }
        };
        let mut header = header.clone();
        header.point_count = entries;
        header.size = file.file_len()?;
        file.write_header(&header)?;
        file.sync()?;
        tracing::info!(
            path = %file.path().display(),
            format = %header.format(),
            entries,
            "serialized LSH index"
        );
        Ok(())
    }

    fn merge_into(&self, path: &Path, format: SerialFormat) -> Result<()> {
        let file = SerialFile::open(path, LockType::Exclusive, &self.lock_options)?;
        let mut header = file.read_header()?;
        self.check_compatible(&header, format)?;

        match header.format() {
            SerialFormat::Format1 => {
                header.point_count += format1::write_tables(&file, &header, &self.store, true)?;
            }
            SerialFormat::Format2 => {
                let mut merged = BucketChainStore::new(
                    header.num_tables as usize,
                    header.num_rows,
                    header.num_cols,
                    header.params().block_full_rows,
                );
                format2::read_tables(file.reader_at(header.hashtable_offset())?, &mut merged)?;
                merged.absorb(&self.store);
                let mut w = file.writer_at(header.hashtable_offset())?;
                format2::write_tables(&mut w, &merged)?;
                drop(w);
                header.point_count = merged.stats().point_count;
            }
        }

        header.max_point = header.max_point().max(self.max_point).unwrap_or(0);
        header.size = file.file_len()?;
        file.write_header(&header)?;
        file.sync()?;
        tracing::info!(
            path = %path.display(),
            format = %header.format(),
            entries = header.point_count,
            max_point = header.max_point,
            "merged LSH index"
        );
        Ok(())
    }

    /// Reopen a serialized index with default locking.
    pub fn open(path: impl AsRef<Path>, mode: LoadMode) -> Result<Self> {
        Self::open_with(path, mode, LockOptions::default())
    }

    /// Reopen a serialized index, rebuilding its hash functions from the file
    /// and, for [`LoadMode::InCore`], its tables.
    pub fn open_with(path: impl AsRef<Path>, mode: LoadMode, lock_options: LockOptions) -> Result<Self> {
        let path = path.as_ref();
        let file = SerialFile::open(path, LockType::Shared, &lock_options)?;
        let header = file.read_header()?;
        header
            .check_bounds()
            .map_err(|e| LshError::Format(format!("{}: corrupt header: {e}", path.display())))?;
        let params = header
            .params()
            .validate()
            .map_err(|e| LshError::Format(format!("{}: corrupt header: {e}", path.display())))?;
        let family = functions::read(&file, &header)?;

        let mut store = BucketChainStore::new(
            family.num_tables(),
            params.num_rows,
            params.max_collisions,
            params.block_full_rows,
        );
        if mode == LoadMode::InCore {
            match header.format() {
                SerialFormat::Format1 => format1::read_tables(&file, &header, &mut store)?,
                SerialFormat::Format2 => {
                    format2::read_tables(file.reader_at(header.hashtable_offset())?, &mut store)?
                }
            }
        }

        tracing::info!(
            path = %path.display(),
            format = %header.format(),
            ?mode,
            points = store.stats().point_count,
            "opened LSH index"
        );
        Ok(LshIndex::from_parts(params, family, store, header.max_point(), lock_options))
    }
}

/// Print the used slots of every table of a FORMAT1 file.
pub fn dump_tables<W: Write>(path: impl AsRef<Path>, out: &mut W) -> Result<()> {
    let path = path.as_ref();
    let file = SerialFile::open(path, LockType::Shared, &LockOptions::default())?;
    let header = file.read_header()?;
    if header.format() != SerialFormat::Format1 {
        return Err(LshError::Unsupported(format!(
            "table dump needs a FORMAT1 file, {} is {}",
            path.display(),
            header.format()
        )));
    }
    format1::dump_tables(&file, &header, out)
}
