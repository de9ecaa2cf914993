use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{TypeError, TypeResult};

/// Domain tag mixed into target fingerprints.
const FINGERPRINT_DOMAIN: &[u8] = b"bw-target-v1:";

/// A bucket/prefix pair observed by exactly one watch loop.
///
/// Targets are plain values: two loops watching the same bucket with
/// different prefixes are unrelated and share no state.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WatchTarget {
    /// Bucket name.
    pub bucket: String,
    /// Key prefix; empty means the whole bucket.
    #[serde(default)]
    pub prefix: String,
}

impl WatchTarget {
    /// Create a new target.
    pub fn new(bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: prefix.into(),
        }
    }

    /// A target covering the whole bucket.
    pub fn bucket(bucket: impl Into<String>) -> Self {
        Self::new(bucket, "")
    }

    /// Reject targets that cannot name a real bucket.
    pub fn validate(&self) -> TypeResult<()> {
        if self.bucket.trim().is_empty() {
            return Err(TypeError::EmptyBucket);
        }
        Ok(())
    }

    /// Stable hex fingerprint used to name persisted state.
    ///
    /// BLAKE3 over `bucket \0 prefix`, so `("a", "b/c")` and `("a/b", "c")`
    /// never collide.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(FINGERPRINT_DOMAIN);
        hasher.update(self.bucket.as_bytes());
        hasher.update(&[0]);
        hasher.update(self.prefix.as_bytes());
        hex::encode(&hasher.finalize().as_bytes()[..16])
    }
}

impl fmt::Debug for WatchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WatchTarget({self})")
    }
}

impl fmt::Display for WatchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.prefix)
    }
}
