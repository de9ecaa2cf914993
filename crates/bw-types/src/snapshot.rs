//! Point-in-time record sets.
//!
//! A [`Snapshot`] is keyed by object key, so the "no duplicate keys"
//! invariant is structural. Decoding goes through [`SnapshotRepr`] and
//! rejects payloads that repeat a key.

use std::collections::btree_map::{self, BTreeMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{TypeError, TypeResult};
use crate::record::ObjectRecord;
use crate::target::WatchTarget;

/// The full recorded state of a target at one point in time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SnapshotRepr", into = "SnapshotRepr")]
pub struct Snapshot {
    target: WatchTarget,
    captured_at: DateTime<Utc>,
    records: BTreeMap<String, ObjectRecord>,
}

impl Snapshot {
    /// Create an empty snapshot.
    pub fn new(target: WatchTarget, captured_at: DateTime<Utc>) -> Self {
        Self {
            target,
            captured_at,
            records: BTreeMap::new(),
        }
    }

    /// Build a snapshot from records, failing on the first repeated key.
    pub fn from_records(
        target: WatchTarget,
        captured_at: DateTime<Utc>,
        records: impl IntoIterator<Item = ObjectRecord>,
    ) -> TypeResult<Self> {
        let mut snapshot = Self::new(target, captured_at);
        for record in records {
            snapshot.insert(record)?;
        }
        Ok(snapshot)
    }

    /// Insert a record whose key is not yet present.
    pub fn insert(&mut self, record: ObjectRecord) -> TypeResult<()> {
        match self.records.entry(record.key.clone()) {
            btree_map::Entry::Occupied(_) => Err(TypeError::DuplicateKey(record.key)),
            btree_map::Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(())
            }
        }
    }

    /// Insert or replace a record, returning the replaced one.
    pub fn upsert(&mut self, record: ObjectRecord) -> Option<ObjectRecord> {
        self.records.insert(record.key.clone(), record)
    }

    /// Remove a record by key.
    pub fn remove(&mut self, key: &str) -> Option<ObjectRecord> {
        self.records.remove(key)
    }

    /// The target this snapshot was captured for.
    pub fn target(&self) -> &WatchTarget {
        &self.target
    }

    /// When the listing that produced this snapshot completed.
    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// Look up a record by key.
    pub fn get(&self, key: &str) -> Option<&ObjectRecord> {
        self.records.get(key)
    }

    /// Returns `true` if a record with this key exists.
    pub fn contains_key(&self, key: &str) -> bool {
        self.records.contains_key(key)
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if the snapshot holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in key order.
    pub fn records(&self) -> impl Iterator<Item = &ObjectRecord> {
        self.records.values()
    }

    /// Keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    /// Sum of all record sizes.
    pub fn total_bytes(&self) -> u64 {
        self.records.values().map(|r| r.size).sum()
    }

    /// Borrow the underlying key → record map.
    pub fn as_map(&self) -> &BTreeMap<String, ObjectRecord> {
        &self.records
    }

    /// Consume the snapshot, yielding records in key order.
    pub fn into_records(self) -> Vec<ObjectRecord> {
        self.records.into_values().collect()
    }
}

/// Wire shape of a snapshot: records as a list, key uniqueness checked on
/// decode.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotRepr {
    target: WatchTarget,
    captured_at: DateTime<Utc>,
    objects: Vec<ObjectRecord>,
}

impl TryFrom<SnapshotRepr> for Snapshot {
    type Error = TypeError;

    fn try_from(repr: SnapshotRepr) -> TypeResult<Self> {
        Snapshot::from_records(repr.target, repr.captured_at, repr.objects)
    }
}

impl From<Snapshot> for SnapshotRepr {
    fn from(snapshot: Snapshot) -> Self {
        Self {
            target: snapshot.target,
            captured_at: snapshot.captured_at,
            objects: snapshot.records.into_values().collect(),
        }
    }
}
