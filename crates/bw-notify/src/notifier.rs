//! Fan-out delivery with per-key ordering.
//!
//! Events are grouped by object key. Groups are delivered concurrently, at
//! most `concurrency` at a time; within a group events go out one after the
//! other in the order they were given. A failed event is reported and the
//! group moves on to its next event.

use std::collections::HashMap;
use std::sync::Arc;

use bw_types::ChangeEvent;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{DeliveryError, SinkError};
use crate::retry::RetryPolicy;
use crate::sink::{Ack, Sink};

/// Default number of keys delivered concurrently.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Tally of one [`Notifier::notify`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Events the sink acknowledged.
    pub acked: usize,
    /// Events given up on after retries or a permanent refusal.
    pub failed: Vec<DeliveryError>,
    /// Events never settled because delivery was cancelled.
    pub skipped: usize,
}

impl DeliveryReport {
    /// Total events accounted for.
    pub fn total(&self) -> usize {
        self.acked + self.failed.len() + self.skipped
    }

    /// `true` if every event was either acked or given up on.
    pub fn is_settled(&self) -> bool {
        self.skipped == 0
    }

    pub fn merge(&mut self, other: DeliveryReport) {
        self.acked += other.acked;
        self.failed.extend(other.failed);
        self.skipped += other.skipped;
    }
}

enum Attempted {
    Acked(Ack),
    Failed(DeliveryError),
    Cancelled,
}

/// Delivers change events to a [`Sink`] under a [`RetryPolicy`].
#[derive(Clone)]
pub struct Notifier {
    sink: Arc<dyn Sink>,
    policy: RetryPolicy,
    concurrency: usize,
}

impl Notifier {
    pub fn new(sink: Arc<dyn Sink>, policy: RetryPolicy) -> Self {
        Self {
            sink,
            policy,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Cap the number of keys in flight. Zero is treated as one.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn sink_name(&self) -> &str {
        self.sink.name()
    }

    /// Deliver `events`, returning once each is acked, failed, or skipped.
    ///
    /// Cancelling `cancel` abandons in-flight attempts and backoff sleeps;
    /// every event not yet settled counts as skipped.
    pub async fn notify(&self, events: Vec<ChangeEvent>, cancel: &CancellationToken) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        if events.is_empty() {
            return report;
        }

        let mut groups = group_by_key(events).into_iter();
        let mut in_flight = FuturesUnordered::new();
        for group in groups.by_ref().take(self.concurrency) {
            in_flight.push(self.deliver_group(group, cancel));
        }
        while let Some(part) = in_flight.next().await {
            report.merge(part);
            if let Some(group) = groups.next() {
                in_flight.push(self.deliver_group(group, cancel));
            }
        }

        debug!(
            sink = self.sink.name(),
            acked = report.acked,
            failed = report.failed.len(),
            skipped = report.skipped,
            "delivery round finished"
        );
        report
    }

    async fn deliver_group(&self, group: Vec<ChangeEvent>, cancel: &CancellationToken) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        let mut events = group.iter();

        while let Some(event) = events.next() {
            if cancel.is_cancelled() {
                report.skipped += 1 + events.len();
                break;
            }
            match self.deliver_one(event, cancel).await {
                Attempted::Acked(_) => report.acked += 1,
                Attempted::Failed(err) => {
                    warn!(
                        watch = %event.target,
                        key = %event.key,
                        kind = %event.kind,
                        error = %err,
                        "giving up on change event"
                    );
                    report.failed.push(err);
                }
                Attempted::Cancelled => {
                    report.skipped += 1 + events.len();
                    break;
                }
            }
        }
        report
    }

    async fn deliver_one(&self, event: &ChangeEvent, cancel: &CancellationToken) -> Attempted {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Attempted::Cancelled,
                result = self.sink.deliver(event) => result,
            };

            let err = match result {
                Ok(ack) => {
                    debug!(key = %event.key, attempt, receipt = ?ack.receipt, "event delivered");
                    return Attempted::Acked(ack);
                }
                Err(err) => err,
            };

            if let SinkError::Permanent(_) = err {
                return Attempted::Failed(DeliveryError::Rejected {
                    event_id: event.id,
                    kind: event.kind,
                    key: event.key.clone(),
                    attempts: attempt,
                    error: err,
                });
            }
            if attempt >= self.policy.max_attempts {
                return Attempted::Failed(DeliveryError::Exhausted {
                    event_id: event.id,
                    kind: event.kind,
                    key: event.key.clone(),
                    attempts: attempt,
                    last: err,
                });
            }

            let backoff = self.policy.backoff(attempt - 1);
            warn!(
                key = %event.key,
                attempt,
                error = %err,
                backoff_ms = backoff.as_millis() as u64,
                "delivery failed, backing off"
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Attempted::Cancelled,
                _ = tokio::time::sleep(backoff) => {}
            }
        }
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("sink", &self.sink.name())
            .field("policy", &self.policy)
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

/// Split events into per-key groups, keeping first-seen key order and the
/// original order inside each group.
fn group_by_key(events: Vec<ChangeEvent>) -> Vec<Vec<ChangeEvent>> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<Vec<ChangeEvent>> = Vec::new();
    for event in events {
        match index.get(&event.key) {
            Some(&slot) => groups[slot].push(event),
            None => {
                index.insert(event.key.clone(), groups.len());
                groups.push(vec![event]);
            }
        }
    }
    groups
}
