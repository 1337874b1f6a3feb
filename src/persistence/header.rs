//! Serialized index header and file layout.
//!
//! # File Layout
//!
//! ```text
//! ┌──────────────────────────────────────────────┐ 0
//! │ Header (128 bytes, little-endian)            │
//! ├──────────────────────────────────────────────┤ 128
//! │ A[S][k'][d]  f32   random projections       │
//! │ b[S][k']     f32   biases                   │
//! │ r1[L][k]     u32   row fold coefficients    │
//! │ r2[L][k]     u32   bucket fold coefficients │
//! ├──────────────────────────────────────────────┤ aligned
//! │ FORMAT1: L tables of N x C (t2, pointID)     │
//! │          slots, each table page-aligned      │
//! │ FORMAT2: token stream, see `format2`         │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! `S` is the number of stored projection sets (`L`, or `m` for pairwise
//! composition) and `k'` the projections per set (`k`, or `k/2`).
//!
//! # Header Fields
//!
//! ```text
//! Offset  Size  Field
//!  0       4    magic
//!  4       4    bin width w (f32)
//!  8       4    tables L
//! 12       4    rows N
//! 16       4    columns C
//! 20       4    element size (8)
//! 24       4    version
//! 28       4    flags
//! 32       4    dimension d
//! 36       4    functions k
//! 40       4    radius (f32)
//! 44       4    max point ID
//! 48       8    file size
//! 56       8    point count
//! 64       8    RNG seed
//! 72       4    base functions m
//! 76       4    table alignment
//! 80      48    reserved (zero)
//! ```

use crate::hash::family::FamilyShape;
use crate::params::{HashComposition, LshParams};
use crate::{LshError, Result};
use std::fmt;

/// Identifies an LSH index file.
pub const LSH_MAGIC: u32 = u32::from_le_bytes(*b"LSHx");

/// Current on-disk version.
pub const SERIAL_VERSION: u32 = 1;

/// Fixed header size in bytes.
pub const HEADER_SIZE: usize = 128;

/// Bytes per FORMAT1 slot: `(t2: u32, pointID: u32)`.
pub const ELEMENT_SIZE: u32 = 8;

pub const FLAG_FORMAT1: u32 = 0x1;
pub const FLAG_FORMAT2: u32 = 0x2;
pub const FLAG_PAIRWISE: u32 = 0x4;
pub const FLAG_DIRECT: u32 = 0x8;
pub const FLAG_BLOCK_FULL_ROWS: u32 = 0x10;

pub const MAX_TABLES: u32 = 256;
pub const MAX_ROWS: u32 = 1 << 29;
pub const MAX_COLS: u32 = 1000;
pub const MAX_FUNS: u32 = 100;
pub const MAX_DIM: u32 = 2000;
pub const MAX_FILE_SIZE: u64 = 4000 * 1024 * 1024;

/// On-disk table encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialFormat {
    /// Fixed `N x C` slot arrays; supports direct memory-mapped retrieval.
    Format1,
    /// Compact token stream; must be loaded in core before retrieval.
    Format2,
}

impl SerialFormat {
    pub fn flag(self) -> u32 {
        match self {
            Self::Format1 => FLAG_FORMAT1,
            Self::Format2 => FLAG_FORMAT2,
        }
    }

    /// Files without either bit are treated as FORMAT1.
    pub fn from_flags(flags: u32) -> Self {
        if flags & FLAG_FORMAT2 != 0 {
            Self::Format2
        } else {
            Self::Format1
        }
    }
}

impl fmt::Display for SerialFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Format1 => f.write_str("FORMAT1"),
            Self::Format2 => f.write_str("FORMAT2"),
        }
    }
}

/// System page size, never below 4 KiB.
pub fn page_size() -> u64 {
    #[cfg(unix)]
    {
        // SAFETY: sysconf has no memory-safety preconditions.
        let sz = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if sz > 0 {
            return (sz as u64).max(4096);
        }
    }
    4096
}

/// Round `x` up to a multiple of `align` (a power of two).
pub fn align_up(x: u64, align: u64) -> u64 {
    debug_assert!(align.is_power_of_two());
    (x + align - 1) & !(align - 1)
}

/// Fixed-size header at the start of every index file.
#[derive(Debug, Clone, PartialEq)]
pub struct SerialHeader {
    pub magic: u32,
    pub bin_width: f32,
    pub num_tables: u32,
    pub num_rows: u32,
    pub num_cols: u32,
    pub element_size: u32,
    pub version: u32,
    pub flags: u32,
    pub dim: u32,
    pub num_funs: u32,
    pub radius: f32,
    pub max_point: u32,
    pub size: u64,
    pub point_count: u64,
    pub seed: u64,
    pub num_base_functions: u32,
    pub table_alignment: u32,
}

impl SerialHeader {
    pub fn new(
        params: &LshParams,
        format: SerialFormat,
        seed: u64,
        max_point: Option<u32>,
        point_count: u64,
    ) -> Self {
        let mut flags = format.flag() | params.composition.flag();
        if params.block_full_rows {
            flags |= FLAG_BLOCK_FULL_ROWS;
        }
        let mut header = Self {
            magic: LSH_MAGIC,
            bin_width: params.bin_width,
            num_tables: params.num_tables(),
            num_rows: params.num_rows,
            num_cols: params.max_collisions,
            element_size: ELEMENT_SIZE,
            version: SERIAL_VERSION,
            flags,
            dim: params.dim,
            num_funs: params.num_funs,
            radius: params.radius,
            max_point: max_point.unwrap_or(0),
            size: 0,
            point_count,
            seed,
            num_base_functions: params.num_base_functions,
            table_alignment: page_size() as u32,
        };
        header.size = header.file_size();
        header
    }

    pub fn format(&self) -> SerialFormat {
        SerialFormat::from_flags(self.flags)
    }

    pub fn composition(&self) -> HashComposition {
        HashComposition::from_flags(self.flags)
    }

    /// Highest point ID stored, if any point was ever written.
    pub fn max_point(&self) -> Option<u32> {
        (self.point_count > 0).then_some(self.max_point)
    }

    /// Reconstruct the construction parameters recorded in this header.
    pub fn params(&self) -> LshParams {
        LshParams {
            bin_width: self.bin_width,
            num_funs: self.num_funs,
            num_base_functions: self.num_base_functions,
            dim: self.dim,
            num_rows: self.num_rows,
            max_collisions: self.num_cols,
            radius: self.radius,
            composition: self.composition(),
            block_full_rows: self.flags & FLAG_BLOCK_FULL_ROWS != 0,
            seed: Some(self.seed),
        }
    }

    pub fn shape(&self) -> FamilyShape {
        FamilyShape::of(&self.params())
    }

    fn alignment(&self) -> u64 {
        let a = self.table_alignment as u64;
        if a.is_power_of_two() && a >= 4096 {
            a
        } else {
            page_size()
        }
    }

    /// Bytes of the hash-function region.
    pub fn function_region_size(&self) -> u64 {
        let shape = self.shape();
        let projections = shape.num_projections() as u64;
        let folds = shape.num_fold_coefficients() as u64;
        projections * shape.dim as u64 * 4 + projections * 4 + 2 * folds * 4
    }

    /// Offset of the first hash table.
    pub fn hashtable_offset(&self) -> u64 {
        align_up(HEADER_SIZE as u64 + self.function_region_size(), self.alignment())
    }

    /// Bytes of one FORMAT1 table.
    pub fn table_size(&self) -> u64 {
        self.num_rows as u64 * self.num_cols as u64 * self.element_size as u64
    }

    /// Offset of FORMAT1 table `j`.
    pub fn table_offset(&self, j: usize) -> u64 {
        self.hashtable_offset() + j as u64 * align_up(self.table_size(), self.alignment())
    }

    /// Exact size for FORMAT1; an estimate from `point_count` for FORMAT2.
    pub fn file_size(&self) -> u64 {
        match self.format() {
            SerialFormat::Format1 => self.table_offset(self.num_tables as usize),
            SerialFormat::Format2 => align_up(
                self.hashtable_offset() + self.point_count * 16,
                self.alignment(),
            ),
        }
    }

    /// Reject parameters the on-disk format cannot represent.
    pub fn check_bounds(&self) -> Result<()> {
        if self.num_tables > MAX_TABLES
            || self.num_rows > MAX_ROWS
            || self.num_cols > MAX_COLS
            || self.num_funs > MAX_FUNS
            || self.dim > MAX_DIM
        {
            return Err(LshError::InvalidConfig(format!(
                "LSH parameters out of bounds for serialization: L={} (max {MAX_TABLES}), \
                 N={} (max {MAX_ROWS}), C={} (max {MAX_COLS}), k={} (max {MAX_FUNS}), d={} (max {MAX_DIM})",
                self.num_tables, self.num_rows, self.num_cols, self.num_funs, self.dim
            )));
        }
        if self.file_size() > MAX_FILE_SIZE {
            return Err(LshError::Capacity(format!(
                "maximum size of LSH file exceeded: {} MB > {} MB",
                self.file_size() >> 20,
                MAX_FILE_SIZE >> 20
            )));
        }
        Ok(())
    }

    pub fn merge_params(&self) -> MergeParams {
        MergeParams {
            flags: self.flags & (FLAG_FORMAT1 | FLAG_FORMAT2),
            composition: self.composition(),
            num_base_functions: self.num_base_functions,
            bin_width: self.bin_width,
            num_tables: self.num_tables,
            num_rows: self.num_rows,
            num_funs: self.num_funs,
            dim: self.dim,
            element_size: self.element_size,
            radius: self.radius,
            seed: self.seed,
        }
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        let mut put = |off: usize, bytes: &[u8]| buf[off..off + bytes.len()].copy_from_slice(bytes);
        put(0, &self.magic.to_le_bytes());
        put(4, &self.bin_width.to_le_bytes());
        put(8, &self.num_tables.to_le_bytes());
        put(12, &self.num_rows.to_le_bytes());
        put(16, &self.num_cols.to_le_bytes());
        put(20, &self.element_size.to_le_bytes());
        put(24, &self.version.to_le_bytes());
        put(28, &self.flags.to_le_bytes());
        put(32, &self.dim.to_le_bytes());
        put(36, &self.num_funs.to_le_bytes());
        put(40, &self.radius.to_le_bytes());
        put(44, &self.max_point.to_le_bytes());
        put(48, &self.size.to_le_bytes());
        put(56, &self.point_count.to_le_bytes());
        put(64, &self.seed.to_le_bytes());
        put(72, &self.num_base_functions.to_le_bytes());
        put(76, &self.table_alignment.to_le_bytes());
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(LshError::Format(format!(
                "header truncated: {} of {HEADER_SIZE} bytes",
                buf.len()
            )));
        }
        let u32_at = |off: usize| u32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]]);
        let u64_at = |off: usize| (u32_at(off) as u64) | ((u32_at(off + 4) as u64) << 32);

        let magic = u32_at(0);
        if magic != LSH_MAGIC {
            return Err(LshError::Format("not an LSH database file".to_string()));
        }
        let version = u32_at(24);
        if version != SERIAL_VERSION {
            return Err(LshError::Format(format!(
                "unsupported LSH file version {version} (expected {SERIAL_VERSION})"
            )));
        }
        let header = Self {
            magic,
            bin_width: f32::from_bits(u32_at(4)),
            num_tables: u32_at(8),
            num_rows: u32_at(12),
            num_cols: u32_at(16),
            element_size: u32_at(20),
            version,
            flags: u32_at(28),
            dim: u32_at(32),
            num_funs: u32_at(36),
            radius: f32::from_bits(u32_at(40)),
            max_point: u32_at(44),
            size: u64_at(48),
            point_count: u64_at(56),
            seed: u64_at(64),
            num_base_functions: u32_at(72),
            table_alignment: u32_at(76),
        };
        if header.element_size != ELEMENT_SIZE {
            return Err(LshError::Format(format!(
                "unsupported element size {}",
                header.element_size
            )));
        }
        if header.num_tables == 0 || header.num_rows == 0 || header.num_cols == 0 || header.num_funs == 0 || header.dim == 0 {
            return Err(LshError::Format("header declares an empty index shape".to_string()));
        }
        let composition = header.composition();
        let m = header.num_base_functions;
        if m < composition.min_base_functions() || composition.checked_num_tables(m) != Some(header.num_tables) {
            return Err(LshError::Format(format!(
                "header declares m={m} base functions for {} {composition:?} tables",
                header.num_tables
            )));
        }
        if composition == HashComposition::Pairwise && header.num_funs % 2 == 1 {
            return Err(LshError::Format(format!(
                "header declares odd k={} for pairwise composition",
                header.num_funs
            )));
        }
        Ok(header)
    }
}

/// Parameters that must agree for an in-core index to merge into a file.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeParams {
    pub flags: u32,
    pub composition: HashComposition,
    pub num_base_functions: u32,
    pub bin_width: f32,
    pub num_tables: u32,
    pub num_rows: u32,
    pub num_funs: u32,
    pub dim: u32,
    pub element_size: u32,
    pub radius: f32,
    pub seed: u64,
}

impl MergeParams {
    pub fn of(params: &LshParams, format: SerialFormat, seed: u64) -> Self {
        Self {
            flags: format.flag(),
            composition: params.composition,
            num_base_functions: params.num_base_functions,
            bin_width: params.bin_width,
            num_tables: params.num_tables(),
            num_rows: params.num_rows,
            num_funs: params.num_funs,
            dim: params.dim,
            element_size: ELEMENT_SIZE,
            radius: params.radius,
            seed,
        }
    }

    /// Side-by-side listing, core (`c`) against serial (`s`).
    pub fn diff(&self, disk: &MergeParams) -> String {
        format!(
            "Fc:{} Fs:{}\nHc:{:?} Hs:{:?}\nmc:{} ms:{}\nWc:{} Ws:{}\nLc:{} Ls:{}\nNc:{} Ns:{}\nkc:{} ks:{}\ndc:{} ds:{}\nsc:{} ss:{}\nrc:{} rs:{}\nseedc:{} seeds:{}",
            self.flags, disk.flags,
            self.composition, disk.composition,
            self.num_base_functions, disk.num_base_functions,
            self.bin_width, disk.bin_width,
            self.num_tables, disk.num_tables,
            self.num_rows, disk.num_rows,
            self.num_funs, disk.num_funs,
            self.dim, disk.dim,
            self.element_size, disk.element_size,
            self.radius, disk.radius,
            self.seed, disk.seed,
        )
    }
}
