use bw_store::StoreError;

/// Errors surfaced by the watch layer.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// Loading or committing a snapshot failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A configuration value is out of range.
    #[error("invalid watch configuration: {0}")]
    Config(String),

    /// A blocking store task panicked or was cancelled.
    #[error("store task failed: {0}")]
    Task(String),
}

/// Result alias for watch operations.
pub type WatchResult<T> = Result<T, WatchError>;
