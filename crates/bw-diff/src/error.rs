//! Error types for the diff crate.

/// Errors that can occur while applying a change set.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DiffError {
    /// The change does not fit the snapshot it is applied to.
    #[error("conflicting {kind} change for {key}: {reason}")]
    Conflict {
        kind: String,
        key: String,
        reason: String,
    },

    /// A change set built from invalid events.
    #[error("invalid event: {0}")]
    InvalidEvent(#[from] bw_types::TypeError),
}

/// Convenience alias for diff results.
pub type DiffResult<T> = Result<T, DiffError>;
