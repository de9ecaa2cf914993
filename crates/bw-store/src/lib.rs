//! Snapshot persistence for bucket-watcher.
//!
//! The state store remembers the last committed [`Snapshot`] of every watch
//! target so that a restarted watcher compares against what it last saw
//! instead of reporting every object as new.
//!
//! # Storage Backends
//!
//! All backends implement the [`SnapshotStore`] trait:
//!
//! - [`InMemorySnapshotStore`] -- `HashMap`-based store for tests and embedding
//! - [`FileSnapshotStore`] -- one checksummed file per target, replaced atomically
//!
//! # Design Rules
//!
//! 1. `save` is all-or-nothing: after a crash `load` sees the old snapshot or
//!    the new one, never a mix.
//! 2. A damaged file is reported as [`StoreError::Corrupt`], never decoded
//!    partially.
//! 3. Targets never share state; each has its own slot.
//! 4. All I/O errors are propagated, never silently ignored.
//!
//! [`Snapshot`]: bw_types::Snapshot

pub mod error;
pub mod file;
pub mod frame;
pub mod memory;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use file::FileSnapshotStore;
pub use memory::InMemorySnapshotStore;
pub use traits::SnapshotStore;
