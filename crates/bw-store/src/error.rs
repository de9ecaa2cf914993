use std::path::PathBuf;

use bw_types::WatchTarget;

/// Errors from snapshot store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The persisted data failed an integrity check.
    #[error("corrupt snapshot at {}: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    /// The persisted snapshot belongs to a different target.
    #[error("snapshot target mismatch: expected {expected}, found {found}")]
    TargetMismatch {
        expected: WatchTarget,
        found: WatchTarget,
    },

    /// The encoded snapshot does not fit the on-disk length field.
    #[error("snapshot too large: {0} bytes")]
    TooLarge(usize),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
