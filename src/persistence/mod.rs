//! On-disk persistence for LSH indexes.
//!
//! An index file holds a fixed header, the hash-function coefficients and the
//! `L` hash tables in one of two encodings:
//!
//! - **FORMAT1** stores each table as a dense `N x C` slot array. Files are
//!   large but can be queried in place through memory mappings.
//! - **FORMAT2** stores only occupied rows as a token stream. Files are small
//!   but must be loaded in core before they can be queried.
//!
//! Serializing to an existing file merges the in-core tables into it, after
//! checking that both sides were built with the same parameters and seed.
//!
//! Readers hold a shared lock and writers an exclusive one for the whole
//! operation; see [`locking`].
//!
//! | Operation | FORMAT1 | FORMAT2 |
//! |-----------|---------|---------|
//! | create | yes | yes |
//! | merge | slot append | load, merge, rewrite |
//! | load in core | yes | yes |
//! | query on disk | yes | no |
//! | dump | yes | no |

pub mod format1;
pub mod format2;
pub mod functions;
pub mod header;
pub mod index_file;
pub mod locking;
pub mod serial_file;

pub use header::{MergeParams, SerialFormat, SerialHeader};
pub use index_file::dump_tables;
pub use locking::{LockOptions, LockType};
