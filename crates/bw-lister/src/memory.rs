//! In-memory object source for testing.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use bw_types::ObjectRecord;

use crate::error::SourceError;
use crate::source::{ListPage, ObjectSource};

/// A deterministic bucket fake.
///
/// Listings are key-ordered and paged `page_size` objects at a time; the
/// continuation token is the last key of the previous page. Failures queued
/// with [`fail_next`](Self::fail_next) are returned by subsequent
/// `list_page` calls in order, before any real work is done.
pub struct InMemorySource {
    buckets: RwLock<HashMap<String, BTreeMap<String, ObjectRecord>>>,
    page_size: usize,
    failures: Mutex<VecDeque<SourceError>>,
    list_calls: AtomicUsize,
}

impl InMemorySource {
    /// Create an empty source. A zero `page_size` is treated as one.
    pub fn new(page_size: usize) -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
            page_size: page_size.max(1),
            failures: Mutex::new(VecDeque::new()),
            list_calls: AtomicUsize::new(0),
        }
    }

    /// Create `bucket` if it does not exist yet.
    pub fn create_bucket(&self, bucket: &str) {
        self.buckets
            .write()
            .expect("lock poisoned")
            .entry(bucket.to_string())
            .or_default();
    }

    /// Insert or replace an object, creating the bucket on demand.
    pub fn put(&self, bucket: &str, record: ObjectRecord) {
        self.buckets
            .write()
            .expect("lock poisoned")
            .entry(bucket.to_string())
            .or_default()
            .insert(record.key.clone(), record);
    }

    /// Delete an object. Returns `true` if it existed.
    pub fn delete(&self, bucket: &str, key: &str) -> bool {
        self.buckets
            .write()
            .expect("lock poisoned")
            .get_mut(bucket)
            .map(|objects| objects.remove(key).is_some())
            .unwrap_or(false)
    }

    /// Queue a failure for an upcoming `list_page` call.
    pub fn fail_next(&self, err: SourceError) {
        self.failures.lock().expect("lock poisoned").push_back(err);
    }

    /// Number of `list_page` calls served so far, failed ones included.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

impl Default for InMemorySource {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl std::fmt::Debug for InMemorySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let buckets = self.buckets.read().expect("lock poisoned");
        f.debug_struct("InMemorySource")
            .field("buckets", &buckets.len())
            .field("page_size", &self.page_size)
            .finish()
    }
}

#[async_trait]
impl ObjectSource for InMemorySource {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        token: Option<&str>,
    ) -> Result<ListPage, SourceError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.failures.lock().expect("lock poisoned").pop_front() {
            return Err(err);
        }

        let buckets = self.buckets.read().expect("lock poisoned");
        let objects = buckets
            .get(bucket)
            .ok_or_else(|| SourceError::Fatal(format!("bucket {bucket:?} not found")))?;

        let mut matching = objects
            .values()
            .filter(|r| r.key.starts_with(prefix))
            .filter(|r| token.map_or(true, |t| r.key.as_str() > t));

        let page: Vec<ObjectRecord> = matching.by_ref().take(self.page_size).cloned().collect();
        let next_token = match (matching.next(), page.last()) {
            (Some(_), Some(last)) => Some(last.key.clone()),
            _ => None,
        };

        Ok(ListPage {
            objects: page,
            next_token,
        })
    }

    async fn head(&self, bucket: &str, key: &str) -> Result<Option<ObjectRecord>, SourceError> {
        let buckets = self.buckets.read().expect("lock poisoned");
        let objects = buckets
            .get(bucket)
            .ok_or_else(|| SourceError::Fatal(format!("bucket {bucket:?} not found")))?;
        Ok(objects.get(key).cloned())
    }
}
