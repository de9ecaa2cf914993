use bw_types::ChangeKind;
use uuid::Uuid;

/// Failure reported by a single [`Sink::deliver`](crate::Sink::deliver) call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    /// The sink may accept the event if asked again later.
    #[error("retryable: {0}")]
    Retryable(String),

    /// The sink will never accept the event.
    #[error("permanent: {0}")]
    Permanent(String),
}

impl SinkError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }
}

/// Result alias for sink calls.
pub type SinkResult<T> = Result<T, SinkError>;

/// An event the notifier gave up on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// Every attempt in the retry budget failed.
    #[error("delivery of {kind} {key} ({event_id}) failed after {attempts} attempt(s): {last}")]
    Exhausted {
        event_id: Uuid,
        kind: ChangeKind,
        key: String,
        attempts: u32,
        last: SinkError,
    },

    /// The sink refused the event outright.
    #[error("delivery of {kind} {key} ({event_id}) rejected on attempt {attempts}: {error}")]
    Rejected {
        event_id: Uuid,
        kind: ChangeKind,
        key: String,
        attempts: u32,
        error: SinkError,
    },
}

impl DeliveryError {
    pub fn key(&self) -> &str {
        match self {
            Self::Exhausted { key, .. } | Self::Rejected { key, .. } => key,
        }
    }

    pub fn event_id(&self) -> Uuid {
        match self {
            Self::Exhausted { event_id, .. } | Self::Rejected { event_id, .. } => *event_id,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. } | Self::Rejected { attempts, .. } => *attempts,
        }
    }
}
