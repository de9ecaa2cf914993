use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{TypeError, TypeResult};
use crate::record::ObjectRecord;
use crate::target::WatchTarget;

/// Classification of a detected change.
///
/// The derived ordering is the emission order: removals, then
/// modifications, then additions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Removed,
    Modified,
    Added,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Removed => "removed",
            Self::Modified => "modified",
            Self::Added => "added",
        };
        write!(f, "{s}")
    }
}

/// A single detected difference between two snapshots.
///
/// The shape is tied to the kind: `Added` carries only `current`,
/// `Removed` only `previous`, `Modified` both. The constructors always
/// produce that shape; [`ChangeEvent::validate`] and decoding check it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "ChangeEventRepr")]
pub struct ChangeEvent {
    /// Unique event id (UUID v7, time-ordered). Sinks may use it as an
    /// idempotency key.
    pub id: Uuid,
    /// The target whose snapshots were compared.
    pub target: WatchTarget,
    pub kind: ChangeKind,
    pub key: String,
    pub previous: Option<ObjectRecord>,
    pub current: Option<ObjectRecord>,
    pub detected_at: DateTime<Utc>,
}

impl ChangeEvent {
    /// An object that exists now but did not before.
    pub fn added(target: WatchTarget, current: ObjectRecord, detected_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            target,
            kind: ChangeKind::Added,
            key: current.key.clone(),
            previous: None,
            current: Some(current),
            detected_at,
        }
    }

    /// An object that existed before but is gone now.
    pub fn removed(
        target: WatchTarget,
        previous: ObjectRecord,
        detected_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            target,
            kind: ChangeKind::Removed,
            key: previous.key.clone(),
            previous: Some(previous),
            current: None,
            detected_at,
        }
    }

    /// An object present in both snapshots whose content differs.
    ///
    /// Both records must share a key.
    pub fn modified(
        target: WatchTarget,
        previous: ObjectRecord,
        current: ObjectRecord,
        detected_at: DateTime<Utc>,
    ) -> Self {
        debug_assert_eq!(previous.key, current.key);
        Self {
            id: Uuid::now_v7(),
            target,
            kind: ChangeKind::Modified,
            key: current.key.clone(),
            previous: Some(previous),
            current: Some(current),
            detected_at,
        }
    }

    /// Check the kind/shape invariant.
    pub fn validate(&self) -> TypeResult<()> {
        let invalid = |reason: &str| TypeError::InvalidEvent {
            kind: self.kind.to_string(),
            key: self.key.clone(),
            reason: reason.to_string(),
        };
        match (self.kind, &self.previous, &self.current) {
            (ChangeKind::Added, None, Some(_)) => {}
            (ChangeKind::Removed, Some(_), None) => {}
            (ChangeKind::Modified, Some(_), Some(_)) => {}
            (ChangeKind::Added, ..) => return Err(invalid("added requires only `current`")),
            (ChangeKind::Removed, ..) => return Err(invalid("removed requires only `previous`")),
            (ChangeKind::Modified, ..) => {
                return Err(invalid("modified requires `previous` and `current`"))
            }
        }
        let keys_match = self.previous.iter().chain(self.current.iter()).all(|r| r.key == self.key);
        if !keys_match {
            return Err(invalid("record key does not match event key"));
        }
        Ok(())
    }

    /// Serialize to the JSON wire shape delivered to sinks.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangeEventRepr {
    id: Uuid,
    target: WatchTarget,
    kind: ChangeKind,
    key: String,
    previous: Option<ObjectRecord>,
    current: Option<ObjectRecord>,
    detected_at: DateTime<Utc>,
}

impl TryFrom<ChangeEventRepr> for ChangeEvent {
    type Error = TypeError;

    fn try_from(repr: ChangeEventRepr) -> TypeResult<Self> {
        let event = ChangeEvent {
            id: repr.id,
            target: repr.target,
            kind: repr.kind,
            key: repr.key,
            previous: repr.previous,
            current: repr.current,
            detected_at: repr.detected_at,
        };
        event.validate()?;
        Ok(event)
    }
}
