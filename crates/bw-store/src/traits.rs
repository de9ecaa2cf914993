use bw_types::{Snapshot, WatchTarget};

use crate::error::StoreResult;

/// Persistent home for the last committed snapshot of each target.
///
/// All implementations must satisfy these invariants:
/// - `save` replaces the previous snapshot for the same target atomically.
/// - `load` returns exactly what a completed `save` stored, or `None`.
/// - Targets are isolated: saving one never affects another.
/// - All I/O errors are propagated, never silently ignored.
pub trait SnapshotStore: Send + Sync {
    /// Load the last committed snapshot for `target`.
    ///
    /// Returns `Ok(None)` if nothing was ever committed.
    fn load(&self, target: &WatchTarget) -> StoreResult<Option<Snapshot>>;

    /// Commit `snapshot` as the new state of its target.
    fn save(&self, snapshot: &Snapshot) -> StoreResult<()>;

    /// Forget the committed state of `target`. Returns `true` if it existed.
    fn remove(&self, target: &WatchTarget) -> StoreResult<bool>;
}
