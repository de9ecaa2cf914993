//! Snapshot differ for bucket-watcher.
//!
//! Compares two snapshots of the same target and produces an ordered
//! [`ChangeSet`]: removals, then modifications, then additions, each group
//! sorted by key.
//!
//! # Key Types
//!
//! - [`diff_snapshots`] / [`diff_from`] -- compute a change set
//! - [`ChangeSet`] -- ordered `ChangeEvent`s with per-kind counters
//! - [`apply_changes`] -- replay a change set onto a snapshot

pub mod error;
pub mod patch;
pub mod snapshot_diff;

pub use error::{DiffError, DiffResult};
pub use patch::apply_changes;
pub use snapshot_diff::{diff_from, diff_snapshots, ChangeSet};
