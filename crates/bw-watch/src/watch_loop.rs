use std::fmt;
use std::sync::Arc;

use bw_diff::diff_from;
use bw_lister::{ListError, Lister};
use bw_notify::{DeliveryReport, Notifier};
use bw_store::{SnapshotStore, StoreError};
use bw_types::{ChangeEvent, Snapshot, WatchTarget};
use chrono::Utc;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::WatchConfig;
use crate::error::{WatchError, WatchResult};
use crate::state::WatchState;

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// What one cycle did.
#[derive(Debug)]
pub enum CycleOutcome {
    /// No snapshot was stored; the listing was committed without events.
    Baseline { objects: usize },
    /// Changes were delivered (or given up on) and the snapshot committed.
    Committed { changes: usize, report: DeliveryReport },
    /// Nothing changed.
    Unchanged,
    /// Transient listing or store failure; retried next tick.
    Skipped { reason: String },
    /// The cycle ran out of time; nothing was committed.
    TimedOut { report: DeliveryReport },
    /// Shutdown was requested; nothing was committed.
    Cancelled,
    /// The target cannot be watched; the loop is terminated.
    Halted { error: ListError },
    /// The cycle panicked; reported by the [`Supervisor`](crate::Supervisor).
    Panicked { reason: String },
}

impl CycleOutcome {
    /// `true` if a snapshot was persisted by this cycle.
    pub fn committed(&self) -> bool {
        matches!(self, Self::Baseline { .. } | Self::Committed { .. })
    }

    /// Stable machine-readable name of the variant.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Baseline { .. } => "baseline",
            Self::Committed { .. } => "committed",
            Self::Unchanged => "unchanged",
            Self::Skipped { .. } => "skipped",
            Self::TimedOut { .. } => "timed_out",
            Self::Cancelled => "cancelled",
            Self::Halted { .. } => "halted",
            Self::Panicked { .. } => "panicked",
        }
    }
}

impl fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Baseline { objects } => write!(f, "baseline of {objects} object(s) committed"),
            Self::Committed { changes, report } => write!(
                f,
                "{changes} change(s): {} acked, {} failed; committed",
                report.acked,
                report.failed.len()
            ),
            Self::Unchanged => f.write_str("unchanged"),
            Self::Skipped { reason } => write!(f, "skipped: {reason}"),
            Self::TimedOut { report } => write!(
                f,
                "timed out: {} acked, {} not delivered",
                report.acked, report.skipped
            ),
            Self::Cancelled => f.write_str("cancelled"),
            Self::Halted { error } => write!(f, "halted: {error}"),
            Self::Panicked { reason } => write!(f, "panicked: {reason}"),
        }
    }
}

/// Why [`WatchLoop::run`] returned.
#[derive(Debug)]
pub enum LoopExit {
    Cancelled,
    Halted(ListError),
    /// The loop's task panicked.
    Panicked(String),
}

impl LoopExit {
    /// `true` unless the loop stopped because it was asked to.
    pub fn is_failure(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }
}

// ---------------------------------------------------------------------------
// WatchLoop
// ---------------------------------------------------------------------------

/// Polls one bucket/prefix, diffs against the stored snapshot, delivers the
/// changes, and commits the new snapshot.
///
/// Stages run strictly in sequence and two cycles of the same loop never
/// overlap. A snapshot is committed only after every change of the cycle
/// was acked or given up on, so an interrupted cycle is replayed in full.
pub struct WatchLoop {
    target: WatchTarget,
    lister: Lister,
    store: Arc<dyn SnapshotStore>,
    notifier: Notifier,
    config: WatchConfig,
    cancel: CancellationToken,
    state: watch::Sender<WatchState>,
}

impl WatchLoop {
    pub fn new(
        target: WatchTarget,
        lister: Lister,
        store: Arc<dyn SnapshotStore>,
        notifier: Notifier,
        config: WatchConfig,
        cancel: CancellationToken,
    ) -> Self {
        let (state, _) = watch::channel(WatchState::Idle);
        Self {
            target,
            lister,
            store,
            notifier,
            config,
            cancel,
            state,
        }
    }

    pub fn target(&self) -> &WatchTarget {
        &self.target
    }

    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    /// Current position in the cycle.
    pub fn state(&self) -> WatchState {
        *self.state.borrow()
    }

    /// Follow state transitions as they happen.
    pub fn subscribe(&self) -> watch::Receiver<WatchState> {
        self.state.subscribe()
    }

    /// Run cycles every poll interval until cancelled or halted.
    ///
    /// The first cycle starts immediately. Ticks missed while a cycle is
    /// still running are dropped.
    pub async fn run(&self) -> LoopExit {
        info!(
            watch = %self.target,
            interval_secs = self.config.poll_interval().as_secs(),
            sink = self.notifier.sink_name(),
            max_attempts = self.notifier.policy().max_attempts,
            "watch started"
        );
        let mut ticker = tokio::time::interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let exit = loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    self.transition(WatchState::Cancelling);
                    break LoopExit::Cancelled;
                }
                _ = ticker.tick() => {}
            }
            match self.run_cycle().await {
                CycleOutcome::Halted { error } => break LoopExit::Halted(error),
                CycleOutcome::Cancelled => break LoopExit::Cancelled,
                outcome => debug!(watch = %self.target, %outcome, "cycle finished"),
            }
        };

        self.transition(WatchState::Terminated);
        info!(watch = %self.target, exit = ?exit, "watch stopped");
        exit
    }

    /// Execute exactly one cycle.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let span = info_span!("watch", watch = %self.target);
        self.cycle().instrument(span).await
    }

    async fn cycle(&self) -> CycleOutcome {
        if self.state().is_terminal() {
            return CycleOutcome::Skipped {
                reason: "watch has terminated".into(),
            };
        }
        if self.cancel.is_cancelled() {
            return self.cancelled();
        }
        let deadline = Instant::now() + self.config.cycle_timeout();

        self.transition(WatchState::Listing);
        let current = match tokio::time::timeout_at(deadline, self.lister.list(&self.target)).await {
            Ok(Ok(snapshot)) => snapshot,
            Ok(Err(err)) if err.is_fatal() => {
                error!(error = %err, "listing failed permanently; stopping watch");
                self.transition(WatchState::Terminated);
                return CycleOutcome::Halted { error: err };
            }
            Ok(Err(err)) => {
                warn!(error = %err, "listing failed; skipping cycle");
                return self.skipped(err.to_string());
            }
            Err(_) => {
                warn!(timeout_secs = self.config.cycle_timeout_secs, "listing exceeded cycle timeout");
                self.transition(WatchState::Idle);
                return CycleOutcome::TimedOut {
                    report: DeliveryReport::default(),
                };
            }
        };
        if self.cancel.is_cancelled() {
            return self.cancelled();
        }

        self.transition(WatchState::Diffing);
        let previous = match self.load_previous().await {
            Ok(previous) => previous,
            Err(err) => {
                warn!(error = %err, "could not load stored snapshot; skipping cycle");
                return self.skipped(err.to_string());
            }
        };

        if previous.is_none() && !self.config.emit_initial {
            let objects = current.len();
            return match self.commit(current).await {
                Ok(()) => {
                    info!(objects, "baseline committed");
                    self.transition(WatchState::Idle);
                    CycleOutcome::Baseline { objects }
                }
                Err(err) => {
                    warn!(error = %err, "could not commit baseline");
                    self.skipped(err.to_string())
                }
            };
        }

        let changes = diff_from(previous.as_ref(), &current, Utc::now());
        if changes.is_empty() {
            // Timestamp-only drift: keep the stored copy current, quietly.
            let drifted = previous.as_ref().map(Snapshot::as_map) != Some(current.as_map());
            if drifted {
                if let Err(err) = self.commit(current).await {
                    warn!(error = %err, "could not refresh stored snapshot");
                }
            }
            self.transition(WatchState::Idle);
            return CycleOutcome::Unchanged;
        }

        info!(
            removed = changes.removals(),
            modified = changes.modifications(),
            added = changes.additions(),
            "changes detected"
        );
        if self.cancel.is_cancelled() {
            return self.cancelled();
        }

        self.transition(WatchState::Notifying);
        let count = changes.len();
        let (report, timed_out) = self.deliver(changes.into_events(), deadline).await;

        if timed_out {
            warn!(
                acked = report.acked,
                undelivered = report.skipped,
                "cycle timed out during delivery; snapshot not committed"
            );
            self.transition(WatchState::Idle);
            return CycleOutcome::TimedOut { report };
        }
        if !report.is_settled() {
            return self.cancelled();
        }

        match self.commit(current).await {
            Ok(()) => {
                self.transition(WatchState::Idle);
                CycleOutcome::Committed {
                    changes: count,
                    report,
                }
            }
            Err(err) => {
                warn!(error = %err, "could not commit snapshot; changes will be re-sent");
                self.skipped(err.to_string())
            }
        }
    }

    /// Deliver `events`, abandoning whatever is unsettled at `deadline`.
    async fn deliver(&self, events: Vec<ChangeEvent>, deadline: Instant) -> (DeliveryReport, bool) {
        let abort = self.cancel.child_token();
        let delivery = self.notifier.notify(events, &abort);
        tokio::pin!(delivery);

        tokio::select! {
            report = &mut delivery => (report, false),
            _ = tokio::time::sleep_until(deadline) => {
                abort.cancel();
                let report = delivery.await;
                let timed_out = !report.is_settled();
                (report, timed_out)
            }
        }
    }

    async fn load_previous(&self) -> WatchResult<Option<Snapshot>> {
        let store = Arc::clone(&self.store);
        let target = self.target.clone();
        let loaded = tokio::task::spawn_blocking(move || store.load(&target))
            .await
            .map_err(|e| WatchError::Task(e.to_string()))?;

        match loaded {
            Ok(snapshot) => Ok(snapshot),
            Err(StoreError::Corrupt { path, reason }) => {
                error!(
                    path = %path.display(),
                    reason = %reason,
                    "stored snapshot is corrupt; starting over from the current listing"
                );
                Ok(None)
            }
            Err(StoreError::TargetMismatch { expected, found }) => {
                error!(
                    expected = %expected,
                    found = %found,
                    "stored snapshot belongs to another target; starting over from the current listing"
                );
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn commit(&self, snapshot: Snapshot) -> WatchResult<()> {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.save(&snapshot))
            .await
            .map_err(|e| WatchError::Task(e.to_string()))??;
        Ok(())
    }

    fn skipped(&self, reason: String) -> CycleOutcome {
        self.transition(WatchState::Idle);
        CycleOutcome::Skipped { reason }
    }

    fn cancelled(&self) -> CycleOutcome {
        self.transition(WatchState::Cancelling);
        CycleOutcome::Cancelled
    }

    fn transition(&self, next: WatchState) {
        let previous = self.state.send_replace(next);
        debug_assert!(
            previous.can_transition_to(next),
            "illegal state transition {previous} -> {next}"
        );
        if previous != next {
            debug!(watch = %self.target, from = %previous, to = %next, "state transition");
        }
    }
}

impl fmt::Debug for WatchLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchLoop")
            .field("target", &self.target)
            .field("state", &self.state())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
