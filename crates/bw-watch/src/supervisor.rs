use std::any::Any;
use std::panic::AssertUnwindSafe;

use bw_types::WatchTarget;
use futures::FutureExt;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::watch_loop::{CycleOutcome, LoopExit, WatchLoop};

/// How one watch loop ended.
#[derive(Debug)]
pub struct LoopReport {
    pub target: WatchTarget,
    pub exit: LoopExit,
}

/// Runs independent watch loops side by side.
///
/// Each loop is its own task. A loop that halts on a fatal error or
/// panics is reported and the others carry on; cancelling the supervisor's
/// token stops them all.
pub struct Supervisor {
    cancel: CancellationToken,
    loops: Vec<WatchLoop>,
}

impl Supervisor {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            loops: Vec::new(),
        }
    }

    /// Token for a new loop: cancelled with the supervisor, never the
    /// other way round.
    pub fn child_token(&self) -> CancellationToken {
        self.cancel.child_token()
    }

    pub fn add(&mut self, watch: WatchLoop) {
        self.loops.push(watch);
    }

    pub fn len(&self) -> usize {
        self.loops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }

    /// Run every loop until it exits, returning one report per loop.
    pub async fn run(self) -> Vec<LoopReport> {
        let mut tasks = JoinSet::new();
        for watch in self.loops {
            tasks.spawn(async move {
                let exit = match AssertUnwindSafe(watch.run()).catch_unwind().await {
                    Ok(exit) => exit,
                    Err(panic) => LoopExit::Panicked(panic_message(panic.as_ref())),
                };
                LoopReport {
                    target: watch.target().clone(),
                    exit,
                }
            });
        }

        let mut reports = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(report) => {
                    match &report.exit {
                        LoopExit::Halted(err) => {
                            error!(watch = %report.target, error = %err, "watch halted")
                        }
                        LoopExit::Panicked(reason) => {
                            error!(watch = %report.target, reason = %reason, "watch panicked")
                        }
                        LoopExit::Cancelled => info!(watch = %report.target, "watch cancelled"),
                    }
                    reports.push(report);
                }
                Err(err) => error!(error = %err, "watch task failed"),
            }
        }
        reports
    }

    /// Run a single cycle of every loop concurrently.
    pub async fn run_once(self) -> Vec<(WatchTarget, CycleOutcome)> {
        let mut tasks = JoinSet::new();
        for watch in self.loops {
            tasks.spawn(async move {
                let outcome = match AssertUnwindSafe(watch.run_cycle()).catch_unwind().await {
                    Ok(outcome) => outcome,
                    Err(panic) => {
                        let reason = panic_message(panic.as_ref());
                        error!(watch = %watch.target(), reason = %reason, "watch cycle panicked");
                        CycleOutcome::Panicked { reason }
                    }
                };
                (watch.target().clone(), outcome)
            });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => warn!(error = %err, "watch cycle task failed"),
            }
        }
        outcomes.sort_by(|a, b| a.0.cmp(&b.0));
        outcomes
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("loops", &self.loops.len())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
