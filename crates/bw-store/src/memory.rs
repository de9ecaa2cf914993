use std::collections::HashMap;
use std::sync::RwLock;

use bw_types::{Snapshot, WatchTarget};

use crate::error::StoreResult;
use crate::traits::SnapshotStore;

/// In-memory, HashMap-based snapshot store.
///
/// Intended for tests and embedding. Snapshots are cloned on read/write.
pub struct InMemorySnapshotStore {
    snapshots: RwLock<HashMap<WatchTarget, Snapshot>>,
}

impl InMemorySnapshotStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            snapshots: RwLock::new(HashMap::new()),
        }
    }

    /// Number of targets with a committed snapshot.
    pub fn len(&self) -> usize {
        self.snapshots.read().expect("lock poisoned").len()
    }

    /// Returns `true` if no snapshot has been committed.
    pub fn is_empty(&self) -> bool {
        self.snapshots.read().expect("lock poisoned").is_empty()
    }

    /// Sorted list of targets with committed state.
    pub fn targets(&self) -> Vec<WatchTarget> {
        let map = self.snapshots.read().expect("lock poisoned");
        let mut targets: Vec<WatchTarget> = map.keys().cloned().collect();
        targets.sort();
        targets
    }
}

impl Default for InMemorySnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotStore for InMemorySnapshotStore {
    fn load(&self, target: &WatchTarget) -> StoreResult<Option<Snapshot>> {
        let map = self.snapshots.read().expect("lock poisoned");
        Ok(map.get(target).cloned())
    }

    fn save(&self, snapshot: &Snapshot) -> StoreResult<()> {
        let mut map = self.snapshots.write().expect("lock poisoned");
        map.insert(snapshot.target().clone(), snapshot.clone());
        Ok(())
    }

    fn remove(&self, target: &WatchTarget) -> StoreResult<bool> {
        let mut map = self.snapshots.write().expect("lock poisoned");
        Ok(map.remove(target).is_some())
    }
}

impl std::fmt::Debug for InMemorySnapshotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemorySnapshotStore")
            .field("target_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bw_types::ObjectRecord;
    use chrono::{DateTime, Utc};

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn snapshot(target: &WatchTarget, keys: &[&str]) -> Snapshot {
        Snapshot::from_records(
            target.clone(),
            at(100),
            keys.iter().map(|k| ObjectRecord::new(*k, 1, "h", at(0))),
        )
        .unwrap()
    }

    #[test]
    fn load_missing_returns_none() {
        let store = InMemorySnapshotStore::new();
        assert!(store.load(&WatchTarget::bucket("b")).unwrap().is_none());
    }

    #[test]
    fn save_then_load() {
        let store = InMemorySnapshotStore::new();
        let target = WatchTarget::new("b", "p/");
        let snap = snapshot(&target, &["p/a", "p/b"]);
        store.save(&snap).unwrap();
        assert_eq!(store.load(&target).unwrap(), Some(snap));
    }

    #[test]
    fn save_replaces_previous() {
        let store = InMemorySnapshotStore::new();
        let target = WatchTarget::bucket("b");
        store.save(&snapshot(&target, &["a"])).unwrap();
        store.save(&snapshot(&target, &["b", "c"])).unwrap();
        let loaded = store.load(&target).unwrap().unwrap();
        assert_eq!(loaded.keys().collect::<Vec<_>>(), vec!["b", "c"]);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn targets_are_isolated() {
        let store = InMemorySnapshotStore::new();
        let t1 = WatchTarget::new("b", "one/");
        let t2 = WatchTarget::new("b", "two/");
        store.save(&snapshot(&t1, &["one/x"])).unwrap();
        assert!(store.load(&t2).unwrap().is_none());
        store.save(&snapshot(&t2, &["two/y"])).unwrap();
        assert_eq!(store.targets(), vec![t1.clone(), t2]);
        assert_eq!(store.load(&t1).unwrap().unwrap().len(), 1);
    }

    #[test]
    fn remove_reports_presence() {
        let store = InMemorySnapshotStore::new();
        let target = WatchTarget::bucket("b");
        assert!(!store.remove(&target).unwrap());
        store.save(&snapshot(&target, &["a"])).unwrap();
        assert!(store.remove(&target).unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn debug_format() {
        let store = InMemorySnapshotStore::default();
        let debug = format!("{store:?}");
        assert!(debug.contains("InMemorySnapshotStore"));
        assert!(debug.contains("target_count"));
    }
}
