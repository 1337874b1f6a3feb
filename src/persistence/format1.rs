//! FORMAT1: every table is a dense `N x C` array of `(t2, pointID)` slots.
//!
//! A row is read left to right until the first slot whose `t2` is
//! [`EMPTY_SLOT`] or until `C` slots have been read. A fresh write stores
//! each in-core bucket as a run of slots with identical `t2`; merges append
//! after the last used slot, so a key may appear in more than one run.

use super::header::SerialHeader;
use super::serial_file::{Access, SerialFile};
use crate::hash::{BucketChainStore, Row};
use crate::Result;
use std::io::Write;

/// Marks the end of a row's used slots.
pub const EMPTY_SLOT: u32 = 0xFFFF_FFFF;

const SLOT: usize = 8;

#[inline]
fn read_slot(row: &[u8], c: usize) -> (u32, u32) {
    let s = &row[c * SLOT..(c + 1) * SLOT];
    (
        u32::from_le_bytes([s[0], s[1], s[2], s[3]]),
        u32::from_le_bytes([s[4], s[5], s[6], s[7]]),
    )
}

#[inline]
fn write_slot(row: &mut [u8], c: usize, t2: u32, point_id: u32) {
    let s = &mut row[c * SLOT..(c + 1) * SLOT];
    s[..4].copy_from_slice(&t2.to_le_bytes());
    s[4..].copy_from_slice(&point_id.to_le_bytes());
}

fn mark_empty(row: &mut [u8], c: usize) {
    if c * SLOT < row.len() {
        write_slot(row, c, EMPTY_SLOT, EMPTY_SLOT);
    }
}

/// Used slots of a row.
pub fn scan_row(row: &[u8]) -> impl Iterator<Item = (u32, u32)> + '_ {
    (0..row.len() / SLOT)
        .map(move |c| read_slot(row, c))
        .take_while(|&(t2, _)| t2 != EMPTY_SLOT)
}

/// Write `row` into fresh slots. Returns the number of slots used. A row of
/// a blocked store never holds more than `C` entries; anything past the last
/// slot is dropped.
pub fn write_row(slots: &mut [u8], row: Option<&Row>) -> usize {
    let cols = slots.len() / SLOT;
    let mut used = 0;
    if let Some(row) = row {
        'buckets: for bucket in row.buckets() {
            for &p in bucket.points() {
                if used == cols {
                    tracing::warn!(cols, "point-chain full");
                    break 'buckets;
                }
                write_slot(slots, used, bucket.t2(), p);
                used += 1;
            }
        }
    }
    mark_empty(slots, used);
    used
}

/// Append the points of `row` after the slots already in use. Pairs already
/// on disk are skipped. When the row fills up the remaining points of the
/// current key are abandoned.
pub fn merge_row(slots: &mut [u8], row: &Row) -> usize {
    let cols = slots.len() / SLOT;
    let mut used = scan_row(slots).count();
    let mut added = 0;
    for bucket in row.buckets() {
        let t2 = bucket.t2();
        for &p in bucket.points() {
            if scan_row(&slots[..used * SLOT]).any(|slot| slot == (t2, p)) {
                continue;
            }
            if used == cols {
                tracing::warn!(cols, t2, "point-chain full");
                break;
            }
            write_slot(slots, used, t2, p);
            used += 1;
            added += 1;
            mark_empty(slots, used);
        }
    }
    added
}

/// Load every used slot of one table into `store`.
pub fn read_table(table: &[u8], cols: usize, j: usize, store: &mut BucketChainStore) {
    for (y, row) in table.chunks_exact(cols * SLOT).enumerate() {
        for (t2, p) in scan_row(row) {
            store.insert(j, y as u32, t2, p);
        }
    }
}

fn row_bytes(table: &[u8], cols: usize, y: u32) -> &[u8] {
    let start = y as usize * cols * SLOT;
    &table[start..start + cols * SLOT]
}

/// Points stored under `t2` in row `y`, in slot order.
pub fn lookup<'a>(table: &'a [u8], cols: usize, y: u32, t2: u32) -> impl Iterator<Item = u32> + 'a {
    scan_row(row_bytes(table, cols, y))
        .filter(move |&(key, _)| key == t2)
        .map(|(_, p)| p)
}

/// Column usage over the non-empty rows of one table.
#[derive(Debug, Clone, Copy, Default)]
struct RowUsage {
    rows: u64,
    slots: u64,
    min: usize,
    max: usize,
}

impl RowUsage {
    fn record(&mut self, used: usize) {
        if used == 0 {
            return;
        }
        self.min = if self.rows == 0 { used } else { self.min.min(used) };
        self.max = self.max.max(used);
        self.rows += 1;
        self.slots += used as u64;
    }

    fn mean(&self) -> f64 {
        if self.rows == 0 {
            0.0
        } else {
            self.slots as f64 / self.rows as f64
        }
    }
}

/// Write (or merge) every table of `store` into the file. Returns the number
/// of slots filled.
pub fn write_tables(file: &SerialFile, header: &SerialHeader, store: &BucketChainStore, merge: bool) -> Result<u64> {
    let cols = header.num_cols as usize;
    let row_len = cols * SLOT;
    let mut total = 0u64;
    for j in 0..header.num_tables as usize {
        let mut table = file.map_mut(header.table_offset(j), header.table_size(), Access::Sequential)?;
        let mut usage = RowUsage::default();
        if merge {
            for (y, row) in store.rows(j) {
                let start = y as usize * row_len;
                let slots = &mut table[start..start + row_len];
                usage.slots += merge_row(slots, row) as u64;
                usage.rows += 1;
            }
        } else {
            for (y, row_slots) in table.chunks_exact_mut(row_len).enumerate() {
                usage.record(write_row(row_slots, store.row(j, y as u32)));
            }
        }
        table.flush()?;
        if merge {
            tracing::info!(table = j, rows = usage.rows, slots_added = usage.slots, "merged FORMAT1 table");
        } else {
            tracing::info!(
                table = j,
                rows = usage.rows,
                mean_cols = usage.mean(),
                min_cols = usage.min,
                max_cols = usage.max,
                "wrote FORMAT1 table"
            );
        }
        total += usage.slots;
    }
    Ok(total)
}

/// Load every table of the file into `store`.
pub fn read_tables(file: &SerialFile, header: &SerialHeader, store: &mut BucketChainStore) -> Result<()> {
    let cols = header.num_cols as usize;
    for j in 0..header.num_tables as usize {
        let table = file.map(header.table_offset(j), header.table_size(), Access::Sequential)?;
        read_table(&table, cols, j, store);
    }
    Ok(())
}

/// Print every non-empty row as `[table,row]:(t2,pointID)...`.
pub fn dump_tables<W: Write>(file: &SerialFile, header: &SerialHeader, out: &mut W) -> Result<()> {
    let cols = header.num_cols as usize;
    for j in 0..header.num_tables as usize {
        let table = file.map(header.table_offset(j), header.table_size(), Access::Sequential)?;
        writeln!(out, "*********** TABLE {j} ***************")?;
        for (y, row) in table.chunks_exact(cols * SLOT).enumerate() {
            let mut slots = scan_row(row).peekable();
            if slots.peek().is_none() {
                continue;
            }
            write!(out, "[{j},{y}]:")?;
            for (t2, p) in slots {
                write!(out, "({t2:X},{p})")?;
            }
            writeln!(out)?;
        }
    }
    Ok(())
}
