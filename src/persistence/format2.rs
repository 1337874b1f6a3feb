//! FORMAT2: tables as a stream of little-endian `u32` tokens.
//!
//! ```text
//! table  := (T1 row group*)* END
//! group  := T2 t2 pointID+
//! ```
//!
//! One `table` is written per hash table, in table order, and rows appear in
//! ascending order. The markers sit in the reserved top of the `u32` range,
//! which neither `t2` (always below `2^32 - 5`) nor a point ID may use.

use crate::hash::BucketChainStore;
use crate::{LshError, Result};
use std::io::{self, Read, Write};

pub const TOKEN_T1: u32 = 0xFFFF_FFFC;
pub const TOKEN_T2: u32 = 0xFFFF_FFFD;
pub const TOKEN_END: u32 = 0xFFFF_FFFE;

/// First reserved value; point IDs and `t2` keys must stay below it.
pub const RESERVED_MIN: u32 = TOKEN_T1;

fn put<W: Write>(w: &mut W, x: u32) -> io::Result<()> {
    w.write_all(&x.to_le_bytes())
}

/// Write table `j` of `store`. Returns `(rows, points)` written.
pub fn write_table<W: Write>(w: &mut W, store: &BucketChainStore, j: usize) -> Result<(u64, u64)> {
    let mut rows = 0u64;
    let mut points = 0u64;
    for (y, row) in store.rows(j) {
        if row.buckets().is_empty() {
            continue;
        }
        rows += 1;
        put(w, TOKEN_T1)?;
        put(w, y)?;
        for bucket in row.buckets() {
            put(w, TOKEN_T2)?;
            put(w, bucket.t2())?;
            for &p in bucket.points() {
                put(w, p)?;
                points += 1;
            }
        }
    }
    put(w, TOKEN_END)?;
    Ok((rows, points))
}

/// Write every table of `store`.
pub fn write_tables<W: Write>(w: &mut W, store: &BucketChainStore) -> Result<u64> {
    let mut points = 0;
    for j in 0..store.num_tables() {
        let (rows, n) = write_table(w, store, j)?;
        tracing::info!(table = j, rows, points = n, "wrote FORMAT2 table");
        points += n;
    }
    w.flush()?;
    Ok(points)
}

struct Tokens<R> {
    inner: R,
    pos: u64,
}

impl<R: Read> Tokens<R> {
    fn next(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        match self.inner.read_exact(&mut buf) {
            Ok(()) => {
                self.pos += 1;
                Ok(u32::from_le_bytes(buf))
            }
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(LshError::Format(format!(
                "token stream truncated after {} tokens",
                self.pos
            ))),
            Err(e) => Err(e.into()),
        }
    }

    fn malformed(&self, what: &str, got: u32) -> LshError {
        LshError::Format(format!("{what}, found {got:#010x} at token {}", self.pos))
    }
}

fn is_marker(x: u32) -> bool {
    x >= RESERVED_MIN
}

/// Read `store.num_tables()` tables into `store`.
pub fn read_tables<R: Read>(r: R, store: &mut BucketChainStore) -> Result<()> {
    let mut tokens = Tokens { inner: r, pos: 0 };
    let num_rows = store.num_rows();
    for j in 0..store.num_tables() {
        let mut tok = tokens.next()?;
        let mut last_row: Option<u32> = None;
        loop {
            match tok {
                TOKEN_END => break,
                TOKEN_T1 => {}
                other => return Err(tokens.malformed("expected T1 or END", other)),
            }

            let y = tokens.next()?;
            if y >= num_rows {
                return Err(tokens.malformed("row index out of range", y));
            }
            if last_row.is_some_and(|prev| y <= prev) {
                return Err(tokens.malformed("rows out of order", y));
            }
            last_row = Some(y);

            tok = tokens.next()?;
            while tok == TOKEN_T2 {
                let t2 = tokens.next()?;
                if is_marker(t2) {
                    return Err(tokens.malformed("expected bucket key after T2", t2));
                }
                let mut count = 0usize;
                tok = tokens.next()?;
                while !is_marker(tok) {
                    store.insert(j, y, t2, tok);
                    count += 1;
                    tok = tokens.next()?;
                }
                if count == 0 {
                    return Err(tokens.malformed("empty bucket", tok));
                }
            }
        }
    }
    Ok(())
}
