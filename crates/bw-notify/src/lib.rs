//! Change-event delivery for bucket-watcher.
//!
//! A [`Sink`] makes single delivery attempts. The [`Notifier`] wraps a sink
//! with a [`RetryPolicy`], fans deliveries out across keys, and keeps events
//! for the same key in emission order.
//!
//! Delivery is at-least-once: an event acknowledged just before a crash is
//! sent again after restart, carrying the same `id`.

pub mod error;
pub mod notifier;
pub mod retry;
pub mod sink;
pub mod sinks;

pub use error::{DeliveryError, SinkError, SinkResult};
pub use notifier::{DeliveryReport, Notifier, DEFAULT_CONCURRENCY};
pub use retry::RetryPolicy;
pub use sink::{Ack, Sink};
pub use sinks::{ChannelSink, LogSink, MemorySink, WebhookSink, IDEMPOTENCY_HEADER};
