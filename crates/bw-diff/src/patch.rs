//! Replay a change set onto a snapshot.
//!
//! Each event is checked against the snapshot it lands on: an addition
//! needs an absent key, a removal or modification needs the key to hold
//! exactly the event's `previous` record.

use bw_types::{ChangeEvent, ChangeKind, ObjectRecord, Snapshot};
use chrono::{DateTime, Utc};

use crate::error::{DiffError, DiffResult};

/// Apply `changes` to a copy of `base` and return the result, stamped
/// `captured_at`.
pub fn apply_changes<'a>(
    base: &Snapshot,
    changes: impl IntoIterator<Item = &'a ChangeEvent>,
    captured_at: DateTime<Utc>,
) -> DiffResult<Snapshot> {
    let mut next = Snapshot::from_records(
        base.target().clone(),
        captured_at,
        base.records().cloned(),
    )?;

    for event in changes {
        event.validate()?;
        let conflict = |reason: &str| DiffError::Conflict {
            kind: event.kind.to_string(),
            key: event.key.clone(),
            reason: reason.to_string(),
        };

        match event.kind {
            ChangeKind::Added => {
                let current = required(&event.current)?;
                next.insert(current.clone())
                    .map_err(|_| conflict("key already present"))?;
            }
            ChangeKind::Removed => {
                let previous = required(&event.previous)?;
                match next.get(&event.key) {
                    Some(existing) if existing == previous => {}
                    Some(_) => return Err(conflict("present record differs from `previous`")),
                    None => return Err(conflict("key not present")),
                }
                next.remove(&event.key);
            }
            ChangeKind::Modified => {
                let previous = required(&event.previous)?;
                let current = required(&event.current)?;
                match next.get(&event.key) {
                    Some(existing) if existing == previous => {}
                    Some(_) => return Err(conflict("present record differs from `previous`")),
                    None => return Err(conflict("key not present")),
                }
                next.upsert(current.clone());
            }
        }
    }

    Ok(next)
}

// `validate` already guarantees presence; this keeps the match arms total.
fn required(record: &Option<ObjectRecord>) -> DiffResult<&ObjectRecord> {
    record.as_ref().ok_or_else(|| DiffError::Conflict {
        kind: "unknown".into(),
        key: String::new(),
        reason: "event is missing a record".into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot_diff::diff_snapshots;
    use bw_types::WatchTarget;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn target() -> WatchTarget {
        WatchTarget::bucket("bucket")
    }

    fn rec(key: &str, hash: &str) -> ObjectRecord {
        ObjectRecord::new(key, 1, hash, at(0))
    }

    fn snap(records: Vec<ObjectRecord>) -> Snapshot {
        Snapshot::from_records(target(), at(0), records).unwrap()
    }

    #[test]
    fn replay_of_diff_yields_target() {
        let a = snap(vec![rec("a", "h1"), rec("b", "h2")]);
        let b = snap(vec![rec("b", "h2x"), rec("c", "h3")]);
        let diff = diff_snapshots(&a, &b, at(1));

        let patched = apply_changes(&a, diff.iter(), at(1)).unwrap();
        assert_eq!(patched.into_records(), b.clone().into_records());
    }

    #[test]
    fn empty_change_set_copies_base() {
        let a = snap(vec![rec("a", "h1")]);
        let patched = apply_changes(&a, std::iter::empty(), at(9)).unwrap();
        assert_eq!(patched.captured_at(), at(9));
        assert_eq!(patched.len(), 1);
    }

    #[test]
    fn adding_existing_key_conflicts() {
        let a = snap(vec![rec("a", "h1")]);
        let event = ChangeEvent::added(target(), rec("a", "h2"), at(1));
        let err = apply_changes(&a, [&event], at(1)).unwrap_err();
        assert!(matches!(err, DiffError::Conflict { ref key, .. } if key == "a"));
    }

    #[test]
    fn removing_missing_key_conflicts() {
        let a = snap(vec![]);
        let event = ChangeEvent::removed(target(), rec("a", "h1"), at(1));
        assert!(apply_changes(&a, [&event], at(1)).is_err());
    }

    #[test]
    fn modifying_from_wrong_previous_conflicts() {
        let a = snap(vec![rec("a", "h1")]);
        let event = ChangeEvent::modified(target(), rec("a", "other"), rec("a", "h2"), at(1));
        assert!(apply_changes(&a, [&event], at(1)).is_err());
    }

    #[test]
    fn malformed_event_is_rejected() {
        let a = snap(vec![]);
        let mut event = ChangeEvent::added(target(), rec("a", "h1"), at(1));
        event.current = None;
        assert!(matches!(
            apply_changes(&a, [&event], at(1)),
            Err(DiffError::InvalidEvent(_))
        ));
    }
}
