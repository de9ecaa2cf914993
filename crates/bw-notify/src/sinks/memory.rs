use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bw_types::ChangeEvent;

use crate::error::{SinkError, SinkResult};
use crate::sink::{Ack, Sink};

/// Records accepted events in memory.
///
/// Failures queued with [`fail_next`](Self::fail_next) are returned by the
/// next calls in order. An optional delay simulates a slow destination.
#[derive(Debug, Default)]
pub struct MemorySink {
    delivered: Mutex<Vec<ChangeEvent>>,
    failures: Mutex<VecDeque<SinkError>>,
    delay: Option<Duration>,
    attempts: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep for `delay` inside every delivery attempt.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn fail_next(&self, err: SinkError) {
        self.failures.lock().expect("lock poisoned").push_back(err);
    }

    /// Accepted events, in acceptance order.
    pub fn delivered(&self) -> Vec<ChangeEvent> {
        self.delivered.lock().expect("lock poisoned").clone()
    }

    /// Delivery attempts so far, failed ones included.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Highest number of attempts observed running at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Sink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    async fn deliver(&self, event: &ChangeEvent) -> SinkResult<Ack> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self.failures.lock().expect("lock poisoned").pop_front();
        if let Some(err) = scripted {
            return Err(err);
        }

        let mut delivered = self.delivered.lock().expect("lock poisoned");
        delivered.push(event.clone());
        Ok(Ack::with_receipt(delivered.len().to_string()))
    }
}
