use async_trait::async_trait;
use bw_types::ChangeEvent;
use tracing::info;

use crate::error::SinkResult;
use crate::sink::{Ack, Sink};

/// Writes one structured `info` line per event.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl Sink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, event: &ChangeEvent) -> SinkResult<Ack> {
        let size = event.current.as_ref().or(event.previous.as_ref()).map(|r| r.size);
        info!(
            watch = %event.target,
            id = %event.id,
            kind = %event.kind,
            key = %event.key,
            size,
            detected_at = %event.detected_at.to_rfc3339(),
            "object changed"
        );
        Ok(Ack::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bw_types::{ObjectRecord, WatchTarget};
    use chrono::{DateTime, Utc};

    #[tokio::test]
    async fn log_sink_always_acks() {
        let at = DateTime::<Utc>::from_timestamp(0, 0).unwrap();
        let event = ChangeEvent::removed(WatchTarget::bucket("b"), ObjectRecord::new("k", 1, "h", at), at);
        assert_eq!(LogSink.deliver(&event).await.unwrap(), Ack::default());
        assert_eq!(LogSink.name(), "log");
    }
}
