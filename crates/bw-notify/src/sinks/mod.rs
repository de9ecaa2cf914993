//! Built-in sinks.

mod channel;
mod log;
mod memory;
mod webhook;

pub use channel::ChannelSink;
pub use log::LogSink;
pub use memory::MemorySink;
pub use webhook::{WebhookSink, IDEMPOTENCY_HEADER};
