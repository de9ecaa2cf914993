use async_trait::async_trait;
use bw_types::ChangeEvent;

use crate::error::SinkResult;

/// Acknowledgement returned by a sink that accepted an event.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Ack {
    /// Sink-specific receipt (HTTP status, queue position, ...).
    pub receipt: Option<String>,
}

impl Ack {
    pub fn with_receipt(receipt: impl Into<String>) -> Self {
        Self {
            receipt: Some(receipt.into()),
        }
    }
}

/// Destination for change events.
///
/// A sink makes one delivery attempt per call; retrying is the notifier's
/// job. Sinks must tolerate the same event (same `id`) arriving twice.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    async fn deliver(&self, event: &ChangeEvent) -> SinkResult<Ack>;
}
