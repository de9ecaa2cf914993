//! Watch loops for bucket-watcher.
//!
//! A [`WatchLoop`] owns one bucket/prefix and repeats the cycle
//! list -> diff -> notify -> commit every poll interval. The
//! [`Supervisor`] runs one loop per target as independent tasks under a
//! shared cancellation token.
//!
//! # Failure Handling
//!
//! | Failure                    | Effect                                        |
//! |----------------------------|-----------------------------------------------|
//! | transient listing error    | cycle skipped, retried next tick              |
//! | fatal listing error        | loop terminated, siblings unaffected          |
//! | store load/save error      | cycle skipped, nothing committed              |
//! | delivery gave up on event  | logged, event dropped, snapshot committed     |
//! | cycle timeout              | remaining deliveries abandoned, no commit     |
//! | shutdown                   | loop stops at the next safe point, no commit  |
//! | panic inside a loop        | reported as `Panicked`, siblings unaffected   |

pub mod config;
pub mod error;
pub mod state;
pub mod supervisor;
pub mod watch_loop;

pub use config::{WatchConfig, MAX_CYCLE_TIMEOUT_SECS, MAX_POLL_INTERVAL_SECS};
pub use error::{WatchError, WatchResult};
pub use state::WatchState;
pub use supervisor::{LoopReport, Supervisor};
pub use watch_loop::{CycleOutcome, LoopExit, WatchLoop};
