//! Foundation types for bucket-watcher.
//!
//! This crate provides the data model shared by every other `bw-*` crate:
//! what is being watched, what was observed, and what changed.
//!
//! # Key Types
//!
//! - [`WatchTarget`]: A bucket/prefix pair; one watch loop per target
//! - [`ObjectRecord`]: Metadata captured for a single object
//! - [`Snapshot`]: Key-unique set of records captured at one instant
//! - [`ChangeEvent`] / [`ChangeKind`]: A single difference between two snapshots

pub mod error;
pub mod event;
pub mod record;
pub mod snapshot;
pub mod target;

pub use error::{TypeError, TypeResult};
pub use event::{ChangeEvent, ChangeKind};
pub use record::ObjectRecord;
pub use snapshot::Snapshot;
pub use target::WatchTarget;
