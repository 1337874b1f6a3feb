//! Locked handle on an index file with region mappings.

use super::header::{SerialHeader, HEADER_SIZE};
use super::locking::{self, LockOptions, LockType};
use crate::{LshError, Result};
use memmap2::{Mmap, MmapMut, MmapOptions};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Expected access pattern for a mapped region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Sequential,
    Random,
}

/// An open index file. The lock taken on open is held until drop.
#[derive(Debug)]
pub struct SerialFile {
    file: File,
    path: PathBuf,
    lock: LockType,
}

impl SerialFile {
    /// Create a new file sized for `header`, exclusively locked.
    ///
    /// Fails if the file already exists.
    pub fn create(path: &Path, header: &SerialHeader, opts: &LockOptions) -> Result<Self> {
        header.check_bounds()?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;
        locking::acquire(&file, path, LockType::Exclusive, opts)?;
        let mut this = Self {
            file,
            path: path.to_path_buf(),
            lock: LockType::Exclusive,
        };

        let size = header.file_size();
        // Extend by writing the last byte so the whole file is addressable.
        this.file.seek(SeekFrom::Start(size - 1))?;
        this.file.write_all(&[0])?;
        this.write_header(header)?;

        tracing::info!(
            path = %path.display(),
            size_mb = size >> 20,
            format = %header.format(),
            "created LSH file"
        );
        Ok(this)
    }

    /// Open an existing file, shared-locked for reading or exclusive for writing.
    pub fn open(path: &Path, lock: LockType, opts: &LockOptions) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(lock == LockType::Exclusive)
            .open(path)?;
        locking::acquire(&file, path, lock, opts)?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
            lock,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_len(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    pub fn read_header(&self) -> Result<SerialHeader> {
        let map = self.map(0, HEADER_SIZE as u64, Access::Sequential)?;
        SerialHeader::decode(&map)
    }

    pub fn write_header(&self, header: &SerialHeader) -> Result<()> {
        let mut map = self.map_mut(0, HEADER_SIZE as u64, Access::Sequential)?;
        map.copy_from_slice(&header.encode());
        map.flush()?;
        Ok(())
    }

    fn check_range(&self, offset: u64, len: u64) -> Result<()> {
        let file_len = self.file_len()?;
        if offset.checked_add(len).map_or(true, |end| end > file_len) {
            return Err(LshError::Format(format!(
                "{}: region {offset}+{len} lies beyond end of file ({file_len} bytes)",
                self.path.display()
            )));
        }
        Ok(())
    }

    /// Map `len` bytes at `offset` read-only.
    pub fn map(&self, offset: u64, len: u64, access: Access) -> Result<Mmap> {
        self.check_range(offset, len)?;
        // SAFETY: the file is locked against concurrent writers for the
        // lifetime of this handle, and mappings do not outlive it in practice.
        let map = unsafe {
            MmapOptions::new()
                .offset(offset)
                .len(len as usize)
                .map(&self.file)?
        };
        advise(&map, access);
        tracing::debug!(offset, len, ?access, "mapped region");
        Ok(map)
    }

    /// Map `len` bytes at `offset` read-write.
    pub fn map_mut(&self, offset: u64, len: u64, access: Access) -> Result<MmapMut> {
        if self.lock != LockType::Exclusive {
            return Err(LshError::InvalidConfig(
                "writable mapping requires an exclusive lock".to_string(),
            ));
        }
        self.check_range(offset, len)?;
        // SAFETY: as for `map`; the exclusive lock excludes all other users.
        let map = unsafe {
            MmapOptions::new()
                .offset(offset)
                .len(len as usize)
                .map_mut(&self.file)?
        };
        advise_mut(&map, access);
        tracing::debug!(offset, len, ?access, "mapped region for writing");
        Ok(map)
    }

    /// Buffered stream reader positioned at `offset`.
    pub fn reader_at(&self, offset: u64) -> Result<BufReader<&File>> {
        let mut f = &self.file;
        f.seek(SeekFrom::Start(offset))?;
        Ok(BufReader::new(f))
    }

    /// Buffered stream writer positioned at `offset`.
    pub fn writer_at(&self, offset: u64) -> Result<BufWriter<&File>> {
        let mut f = &self.file;
        f.seek(SeekFrom::Start(offset))?;
        Ok(BufWriter::new(f))
    }

    pub fn sync(&self) -> Result<()> {
        self.file.sync_data()?;
        Ok(())
    }
}

impl Drop for SerialFile {
    fn drop(&mut self) {
        if let Err(e) = locking::release(&self.file) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release lock");
        }
    }
}

#[cfg(unix)]
fn advise(map: &Mmap, access: Access) {
    if let Err(e) = map.advise(to_advice(access)) {
        tracing::debug!(error = %e, "madvise failed");
    }
}

#[cfg(unix)]
fn advise_mut(map: &MmapMut, access: Access) {
    if let Err(e) = map.advise(to_advice(access)) {
        tracing::debug!(error = %e, "madvise failed");
    }
}

#[cfg(unix)]
fn to_advice(access: Access) -> memmap2::Advice {
    match access {
        Access::Sequential => memmap2::Advice::Sequential,
        Access::Random => memmap2::Advice::Random,
    }
}

#[cfg(not(unix))]
fn advise(_map: &Mmap, _access: Access) {}

#[cfg(not(unix))]
fn advise_mut(_map: &MmapMut, _access: Access) {}
