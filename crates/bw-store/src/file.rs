use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use bw_types::{Snapshot, WatchTarget};
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::frame::{self, FrameError};
use crate::traits::SnapshotStore;

/// Extension of committed snapshot files.
const SNAPSHOT_EXT: &str = "snapshot";

/// Snapshot store backed by one file per target in a local directory.
///
/// Files are named after [`WatchTarget::fingerprint`]. A save writes the
/// framed snapshot to a temporary file in the same directory, fsyncs it,
/// renames it over the committed file, then fsyncs the directory. Rename
/// within a directory is atomic, so a crash at any point leaves either the
/// old file or the new one in place. Orphaned temporary files are never
/// read.
pub struct FileSnapshotStore {
    root: PathBuf,
}

impl FileSnapshotStore {
    /// Open (or create) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Directory holding the snapshot files.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the committed snapshot file for `target`.
    pub fn path_for(&self, target: &WatchTarget) -> PathBuf {
        self.root
            .join(format!("{}.{SNAPSHOT_EXT}", target.fingerprint()))
    }

    fn write_atomically(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        let mut tmp = tempfile::Builder::new()
            .prefix(".bw-")
            .suffix(".tmp")
            .tempfile_in(&self.root)?;
        tmp.write_all(bytes)?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;
        sync_dir(&self.root)
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn load(&self, target: &WatchTarget) -> StoreResult<Option<Snapshot>> {
        let path = self.path_for(target);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let corrupt = |reason: String| StoreError::Corrupt {
            path: path.clone(),
            reason,
        };

        let payload = frame::decode(&bytes).map_err(|e| {
            warn!(path = %path.display(), error = %e, "snapshot failed integrity check");
            corrupt(e.to_string())
        })?;
        let snapshot: Snapshot =
            serde_json::from_slice(payload).map_err(|e| corrupt(e.to_string()))?;

        if snapshot.target() != target {
            return Err(StoreError::TargetMismatch {
                expected: target.clone(),
                found: snapshot.target().clone(),
            });
        }

        debug!(watch = %target, objects = snapshot.len(), "snapshot loaded");
        Ok(Some(snapshot))
    }

    fn save(&self, snapshot: &Snapshot) -> StoreResult<()> {
        let payload =
            serde_json::to_vec(snapshot).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let bytes = frame::encode(&payload).map_err(|e| match e {
            FrameError::TooLarge(n) => StoreError::TooLarge(n),
            other => StoreError::Serialization(other.to_string()),
        })?;

        let path = self.path_for(snapshot.target());
        self.write_atomically(&path, &bytes)?;

        debug!(
            watch = %snapshot.target(),
            objects = snapshot.len(),
            bytes = bytes.len(),
            "snapshot committed"
        );
        Ok(())
    }

    fn remove(&self, target: &WatchTarget) -> StoreResult<bool> {
        match fs::remove_file(self.path_for(target)) {
            Ok(()) => {
                sync_dir(&self.root)?;
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

impl std::fmt::Debug for FileSnapshotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSnapshotStore")
            .field("root", &self.root)
            .finish()
    }
}

/// Persist directory entries (the rename) on platforms that allow it.
#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    fs::File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bw_types::ObjectRecord;
    use chrono::{DateTime, Utc};
    use std::fs::OpenOptions;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn target() -> WatchTarget {
        WatchTarget::new("scans", "inbox/")
    }

    fn snapshot(pairs: &[(&str, &str)]) -> Snapshot {
        Snapshot::from_records(
            target(),
            at(1_700_000_000),
            pairs
                .iter()
                .map(|(k, h)| ObjectRecord::new(*k, h.len() as u64, *h, at(1_600_000_000))),
        )
        .unwrap()
    }

    fn stray_files(dir: &Path) -> Vec<String> {
        fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| !name.ends_with(SNAPSHOT_EXT))
            .collect()
    }

    #[test]
    fn load_without_save_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::open(dir.path()).unwrap();
        assert!(store.load(&target()).unwrap().is_none());
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::open(dir.path()).unwrap();
        let snap = snapshot(&[("inbox/a.pdf", "h1"), ("inbox/b.pdf", "h2")]);

        store.save(&snap).unwrap();
        assert_eq!(store.load(&target()).unwrap(), Some(snap));
        assert!(stray_files(dir.path()).is_empty(), "temp file left behind");
    }

    #[test]
    fn open_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let store = FileSnapshotStore::open(&nested).unwrap();
        store.save(&snapshot(&[("inbox/x", "h")])).unwrap();
        assert!(store.path_for(&target()).exists());
    }

    #[test]
    fn reopen_sees_committed_state() {
        let dir = tempfile::tempdir().unwrap();
        let snap = snapshot(&[("inbox/a", "h")]);
        FileSnapshotStore::open(dir.path()).unwrap().save(&snap).unwrap();

        let reopened = FileSnapshotStore::open(dir.path()).unwrap();
        assert_eq!(reopened.load(&target()).unwrap(), Some(snap));
    }

    #[test]
    fn crash_before_rename_keeps_old_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::open(dir.path()).unwrap();
        let old = snapshot(&[("inbox/a", "h1")]);
        store.save(&old).unwrap();

        // A writer died after writing half of the next snapshot to its temp
        // file; the rename never happened.
        let next = snapshot(&[("inbox/a", "h1"), ("inbox/b", "h2")]);
        let full = frame::encode(&serde_json::to_vec(&next).unwrap()).unwrap();
        fs::write(dir.path().join(".bw-crashed.tmp"), &full[..full.len() / 2]).unwrap();

        assert_eq!(store.load(&target()).unwrap(), Some(old));
    }

    #[test]
    fn torn_committed_file_is_reported_not_decoded() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::open(dir.path()).unwrap();
        store
            .save(&snapshot(&[("inbox/a", "h1"), ("inbox/b", "h2")]))
            .unwrap();

        let path = store.path_for(&target());
        let len = fs::metadata(&path).unwrap().len();
        OpenOptions::new()
            .write(true)
            .open(&path)
            .unwrap()
            .set_len(len - 5)
            .unwrap();

        let err = store.load(&target()).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }), "got {err:?}");
    }

    #[test]
    fn flipped_byte_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::open(dir.path()).unwrap();
        store.save(&snapshot(&[("inbox/a", "h1")])).unwrap();

        let path = store.path_for(&target());
        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 3;
        bytes[last] ^= 0x20;
        fs::write(&path, &bytes).unwrap();

        assert!(matches!(
            store.load(&target()),
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn foreign_snapshot_is_a_target_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::open(dir.path()).unwrap();
        store.save(&snapshot(&[("inbox/a", "h")])).unwrap();

        let other = WatchTarget::new("other", "");
        fs::copy(store.path_for(&target()), store.path_for(&other)).unwrap();

        assert!(matches!(
            store.load(&other),
            Err(StoreError::TargetMismatch { .. })
        ));
    }

    #[test]
    fn save_overwrites_and_remove_deletes() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::open(dir.path()).unwrap();
        store.save(&snapshot(&[("inbox/a", "h1")])).unwrap();
        let newer = snapshot(&[("inbox/b", "h2")]);
        store.save(&newer).unwrap();
        assert_eq!(store.load(&target()).unwrap(), Some(newer));

        assert!(store.remove(&target()).unwrap());
        assert!(!store.remove(&target()).unwrap());
        assert!(store.load(&target()).unwrap().is_none());
    }

    #[test]
    fn targets_use_distinct_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::open(dir.path()).unwrap();
        let a = WatchTarget::new("b", "one/");
        let b = WatchTarget::new("b", "two/");
        assert_ne!(store.path_for(&a), store.path_for(&b));
    }
}
