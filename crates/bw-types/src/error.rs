use thiserror::Error;

/// Errors produced when constructing or decoding data-model values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("duplicate object key in snapshot: {0}")]
    DuplicateKey(String),

    #[error("watch target has an empty bucket name")]
    EmptyBucket,

    #[error("invalid {kind} event for {key}: {reason}")]
    InvalidEvent {
        kind: String,
        key: String,
        reason: String,
    },
}

/// Result alias for type-level operations.
pub type TypeResult<T> = Result<T, TypeError>;
