use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata captured for a single object during a listing.
///
/// Records are immutable once captured. Within a snapshot a record is
/// identified by its `key`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRecord {
    /// Full object key within the bucket.
    pub key: String,
    /// Size in bytes.
    pub size: u64,
    /// Provider checksum (ETag, MD5, CRC32C, ...). Compared verbatim.
    pub content_hash: String,
    /// Provider-reported modification time.
    pub last_modified: DateTime<Utc>,
}

impl ObjectRecord {
    /// Create a new record.
    pub fn new(
        key: impl Into<String>,
        size: u64,
        content_hash: impl Into<String>,
        last_modified: DateTime<Utc>,
    ) -> Self {
        Self {
            key: key.into(),
            size,
            content_hash: content_hash.into(),
            last_modified,
        }
    }

    /// Returns `true` if both records describe the same content.
    ///
    /// Only size and checksum participate; a touched timestamp alone is not
    /// a content change.
    pub fn same_content(&self, other: &Self) -> bool {
        self.size == other.size && self.content_hash == other.content_hash
    }
}
