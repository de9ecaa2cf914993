//! Snapshot-level diff: compare the previous and current listing of a target.
//!
//! Both snapshots are key-sorted maps, so a single merge walk classifies
//! every key. A key present on both sides with a different size or checksum
//! is `Modified`, never `Removed` + `Added`. A key whose only difference is
//! its timestamp produces nothing.

use std::cmp::Ordering;

use bw_types::{ChangeEvent, ChangeKind, Snapshot};
use chrono::{DateTime, Utc};

/// The ordered result of comparing two snapshots.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Removals, then modifications, then additions; key-sorted per group.
    pub events: Vec<ChangeEvent>,
}

impl ChangeSet {
    /// Create an empty change set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if there are no changes.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Number of changes.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Number of added keys.
    pub fn additions(&self) -> usize {
        self.count(ChangeKind::Added)
    }

    /// Number of removed keys.
    pub fn removals(&self) -> usize {
        self.count(ChangeKind::Removed)
    }

    /// Number of modified keys.
    pub fn modifications(&self) -> usize {
        self.count(ChangeKind::Modified)
    }

    /// Iterate events in emission order.
    pub fn iter(&self) -> std::slice::Iter<'_, ChangeEvent> {
        self.events.iter()
    }

    /// Take the events out of the set.
    pub fn into_events(self) -> Vec<ChangeEvent> {
        self.events
    }

    fn count(&self, kind: ChangeKind) -> usize {
        self.events.iter().filter(|e| e.kind == kind).count()
    }
}

impl IntoIterator for ChangeSet {
    type Item = ChangeEvent;
    type IntoIter = std::vec::IntoIter<ChangeEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.into_iter()
    }
}

/// Compute the changes that turn `previous` into `current`.
///
/// Events are attributed to `current`'s target and stamped `detected_at`.
pub fn diff_snapshots(
    previous: &Snapshot,
    current: &Snapshot,
    detected_at: DateTime<Utc>,
) -> ChangeSet {
    let target = current.target();
    let mut removed = Vec::new();
    let mut modified = Vec::new();
    let mut added = Vec::new();

    let mut old_iter = previous.records().peekable();
    let mut new_iter = current.records().peekable();

    loop {
        let order = match (old_iter.peek(), new_iter.peek()) {
            (None, None) => break,
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some(old), Some(new)) => old.key.cmp(&new.key),
        };

        match order {
            Ordering::Less => {
                if let Some(old) = old_iter.next() {
                    removed.push(ChangeEvent::removed(target.clone(), old.clone(), detected_at));
                }
            }
            Ordering::Greater => {
                if let Some(new) = new_iter.next() {
                    added.push(ChangeEvent::added(target.clone(), new.clone(), detected_at));
                }
            }
            Ordering::Equal => {
                if let (Some(old), Some(new)) = (old_iter.next(), new_iter.next()) {
                    if !old.same_content(new) {
                        modified.push(ChangeEvent::modified(
                            target.clone(),
                            old.clone(),
                            new.clone(),
                            detected_at,
                        ));
                    }
                }
            }
        }
    }

    let mut events = removed;
    events.append(&mut modified);
    events.append(&mut added);
    ChangeSet { events }
}

/// Like [`diff_snapshots`], treating a missing previous snapshot as empty.
pub fn diff_from(
    previous: Option<&Snapshot>,
    current: &Snapshot,
    detected_at: DateTime<Utc>,
) -> ChangeSet {
    match previous {
        Some(previous) => diff_snapshots(previous, current, detected_at),
        None => {
            let empty = Snapshot::new(current.target().clone(), current.captured_at());
            diff_snapshots(&empty, current, detected_at)
        }
    }
}
