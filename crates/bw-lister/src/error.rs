use bw_types::WatchTarget;

/// Failure reported by an [`ObjectSource`](crate::ObjectSource) call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    /// Network failure, throttling, server error: worth retrying later.
    #[error("transient: {0}")]
    Transient(String),

    /// Missing bucket, denied access, bad configuration: retrying won't help.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl SourceError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

/// Errors from listing a watch target.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ListError {
    /// The listing could not be completed this time.
    #[error("transient fetch error listing {target}: {reason}")]
    TransientFetch { target: WatchTarget, reason: String },

    /// The target cannot be listed until an operator intervenes.
    #[error("fatal configuration error listing {target}: {reason}")]
    FatalConfig { target: WatchTarget, reason: String },

    /// The provider handed back a continuation token it already issued.
    #[error("pagination loop listing {target}: token {token:?} repeated")]
    PaginationLoop { target: WatchTarget, token: String },

    /// The listing did not finish within the page budget.
    #[error("listing {target} exceeded {limit} pages")]
    TooManyPages { target: WatchTarget, limit: usize },
}

impl ListError {
    /// Attribute a source failure to `target`.
    pub fn from_source(target: &WatchTarget, err: SourceError) -> Self {
        match err {
            SourceError::Transient(reason) => Self::TransientFetch {
                target: target.clone(),
                reason,
            },
            SourceError::Fatal(reason) => Self::FatalConfig {
                target: target.clone(),
                reason,
            },
        }
    }

    /// Whether the watch loop must stop. Everything else skips one cycle.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::FatalConfig { .. })
    }

    /// The target the failure belongs to.
    pub fn target(&self) -> &WatchTarget {
        match self {
            Self::TransientFetch { target, .. }
            | Self::FatalConfig { target, .. }
            | Self::PaginationLoop { target, .. }
            | Self::TooManyPages { target, .. } => target,
        }
    }
}

/// Result alias for listing operations.
pub type ListResult<T> = Result<T, ListError>;
