//! Bucket listing for bucket-watcher.
//!
//! The [`Lister`] turns a paginated provider listing into one complete
//! [`Snapshot`]. It never talks to a cloud SDK directly: storage access is
//! the narrow [`ObjectSource`] capability, constructed by the caller and
//! passed in, so the lister is tested against [`InMemorySource`].
//!
//! # Backends
//!
//! - [`InMemorySource`] -- scripted fake with configurable page size and failures
//! - [`ObjectStoreSource`] -- adapter over the `object_store` crate (GCS, S3,
//!   local filesystem, in-memory)
//!
//! # Failure Model
//!
//! A listing either succeeds completely or fails with a [`ListError`] that
//! is *transient* (skip the cycle, retry next tick) or *fatal* (missing
//! bucket, denied access; stop watching). Partial listings are never
//! returned as success.
//!
//! [`Snapshot`]: bw_types::Snapshot

pub mod error;
pub mod filter;
pub mod lister;
pub mod memory;
pub mod source;
pub mod store_source;

pub use error::{ListError, ListResult, SourceError};
pub use filter::KeyFilter;
pub use lister::{Lister, DEFAULT_MAX_PAGES};
pub use memory::InMemorySource;
pub use source::{ListPage, ObjectSource};
pub use store_source::ObjectStoreSource;
