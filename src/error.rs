//! Error types for lshdb.

use crate::persistence::header::MergeParams;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while building, serializing or querying an index.
#[derive(Debug, Error)]
pub enum LshError {
    /// Invalid construction parameter or serialization request.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// In-core and on-disk structures cannot be merged.
    #[error("incompatible core and serial LSH, data structure dimensions mismatch\n{}", .core.diff(.disk))]
    Incompatible {
        core: Box<MergeParams>,
        disk: Box<MergeParams>,
    },

    /// Corrupt or malformed on-disk structure (bad magic, token stream errors, truncation).
    #[error("format error: {0}")]
    Format(String),

    /// I/O error (open, seek, read, write, mmap, lock).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A lock could not be acquired before the configured timeout elapsed.
    #[error("timed out after {waited:?} waiting for lock on {}", .path.display())]
    LockTimeout { path: PathBuf, waited: Duration },

    /// A hard size limit was exceeded.
    #[error("capacity exceeded: {0}")]
    Capacity(String),

    /// Point IDs must be inserted in strictly ascending order.
    #[error("points must be indexed in strict ascending order: got {point_id}, max is {max_point}")]
    OrderingViolation { point_id: u32, max_point: u32 },

    /// Point ID collides with the reserved token range of the stream format.
    #[error("point id {0:#010x} is reserved")]
    InvalidPointId(u32),

    /// Vector length does not match the index dimensionality.
    #[error("dimension mismatch: index has {expected} dimensions, vector has {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Operation not supported for this table format.
    #[error("operation not supported: {0}")]
    Unsupported(String),
}

/// Result type for lshdb operations.
pub type Result<T> = std::result::Result<T, LshError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_message_names_both_ids() {
        let e = LshError::OrderingViolation {
            point_id: 3,
            max_point: 5,
        };
        let msg = e.to_string();
        assert!(msg.contains('3') && msg.contains('5'), "{msg}");
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let e: LshError = io.into();
        assert!(matches!(e, LshError::Io(_)));
    }
}
