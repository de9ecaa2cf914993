use async_trait::async_trait;
use bw_types::ChangeEvent;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::error::{SinkError, SinkResult};
use crate::sink::{Ack, Sink};

/// Hands events to an in-process consumer over a bounded queue.
///
/// A full queue is a retryable failure, so backpressure from the consumer
/// feeds into the notifier's backoff. A dropped receiver is permanent.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<ChangeEvent>,
}

impl ChannelSink {
    /// Create a sink and the receiving end of its queue.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ChangeEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Sink for ChannelSink {
    fn name(&self) -> &str {
        "channel"
    }

    async fn deliver(&self, event: &ChangeEvent) -> SinkResult<Ack> {
        match self.tx.try_send(event.clone()) {
            Ok(()) => Ok(Ack::default()),
            Err(TrySendError::Full(_)) => Err(SinkError::Retryable("queue full".into())),
            Err(TrySendError::Closed(_)) => Err(SinkError::Permanent("receiver dropped".into())),
        }
    }
}
