//! [`ObjectSource`] backed by the `object_store` crate.
//!
//! One `object_store` instance is bound to one bucket, so the source keeps
//! a store per configured bucket. Listing a bucket that was not configured
//! is a fatal error.

use std::collections::HashMap;
use std::path::Path as FsPath;
use std::sync::Arc;

use async_trait::async_trait;
use bw_types::ObjectRecord;
use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{ObjectMeta, ObjectStore};
use tracing::debug;

use crate::error::SourceError;
use crate::source::{ListPage, ObjectSource};

/// Objects per page for backends that list in key order.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Lists buckets through `object_store` backends.
#[derive(Clone)]
pub struct ObjectStoreSource {
    stores: HashMap<String, Arc<dyn ObjectStore>>,
    /// `None` drains a listing into a single page.
    page_size: Option<usize>,
}

impl ObjectStoreSource {
    /// An empty source; add buckets with [`with_store`](Self::with_store).
    pub fn new() -> Self {
        Self {
            stores: HashMap::new(),
            page_size: Some(DEFAULT_PAGE_SIZE),
        }
    }

    /// Serve `bucket` from `store`.
    pub fn with_store(mut self, bucket: impl Into<String>, store: Arc<dyn ObjectStore>) -> Self {
        self.stores.insert(bucket.into(), store);
        self
    }

    /// Page size for offset-based paging. Only valid for backends whose
    /// listings are ordered by key; `None` lists everything in one page.
    pub fn with_page_size(mut self, page_size: Option<usize>) -> Self {
        self.page_size = page_size.map(|n| n.max(1));
        self
    }

    /// Google Cloud Storage, credentials taken from the environment.
    pub fn gcs<I, S>(buckets: I) -> Result<Self, SourceError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut source = Self::new();
        for bucket in buckets {
            let bucket = bucket.as_ref();
            let store = GoogleCloudStorageBuilder::from_env()
                .with_bucket_name(bucket)
                .build()
                .map_err(|e| SourceError::Fatal(format!("gcs client for {bucket:?}: {e}")))?;
            source = source.with_store(bucket, Arc::new(store));
        }
        Ok(source)
    }

    /// Amazon S3 or an S3-compatible service at `endpoint`.
    pub fn s3<I, S>(buckets: I, region: Option<&str>, endpoint: Option<&str>) -> Result<Self, SourceError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut source = Self::new();
        for bucket in buckets {
            let bucket = bucket.as_ref();
            let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);
            if let Some(region) = region {
                builder = builder.with_region(region);
            }
            if let Some(endpoint) = endpoint {
                builder = builder
                    .with_endpoint(endpoint)
                    .with_allow_http(endpoint.starts_with("http://"));
            }
            let store = builder
                .build()
                .map_err(|e| SourceError::Fatal(format!("s3 client for {bucket:?}: {e}")))?;
            source = source.with_store(bucket, Arc::new(store));
        }
        Ok(source)
    }

    /// Buckets as directories under `root`. Each directory must exist.
    pub fn local<I, S>(root: &FsPath, buckets: I) -> Result<Self, SourceError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut source = Self::new().with_page_size(None);
        for bucket in buckets {
            let bucket = bucket.as_ref();
            let dir = root.join(bucket);
            let store = LocalFileSystem::new_with_prefix(&dir)
                .map_err(|e| SourceError::Fatal(format!("bucket directory {}: {e}", dir.display())))?;
            source = source.with_store(bucket, Arc::new(store));
        }
        Ok(source)
    }

    /// Empty in-memory buckets.
    pub fn in_memory<I, S>(buckets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        buckets.into_iter().fold(Self::new(), |source, bucket| {
            source.with_store(bucket.as_ref(), Arc::new(InMemory::new()))
        })
    }

    /// The store serving `bucket`, if configured.
    pub fn store(&self, bucket: &str) -> Option<&Arc<dyn ObjectStore>> {
        self.stores.get(bucket)
    }

    fn store_for(&self, bucket: &str) -> Result<&Arc<dyn ObjectStore>, SourceError> {
        self.store(bucket)
            .ok_or_else(|| SourceError::Fatal(format!("bucket {bucket:?} is not configured")))
    }
}

impl Default for ObjectStoreSource {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ObjectStoreSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut buckets: Vec<_> = self.stores.keys().collect();
        buckets.sort();
        f.debug_struct("ObjectStoreSource")
            .field("buckets", &buckets)
            .field("page_size", &self.page_size)
            .finish()
    }
}

#[async_trait]
impl ObjectSource for ObjectStoreSource {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        token: Option<&str>,
    ) -> Result<ListPage, SourceError> {
        let store = self.store_for(bucket)?;
        let scope = list_scope(prefix);

        let mut stream = match (self.page_size, token) {
            (Some(_), Some(token)) => {
                let offset = Path::parse(token)
                    .map_err(|e| SourceError::Fatal(format!("bad continuation token {token:?}: {e}")))?;
                store.list_with_offset(scope.as_ref(), &offset)
            }
            _ => store.list(scope.as_ref()),
        };

        let limit = self.page_size.unwrap_or(usize::MAX);
        let mut objects = Vec::new();
        let mut more = false;
        while let Some(meta) = stream.try_next().await.map_err(classify)? {
            if !meta.location.as_ref().starts_with(prefix) {
                continue;
            }
            if objects.len() == limit {
                more = true;
                break;
            }
            objects.push(to_record(meta));
        }

        let next_token = if more {
            objects.last().map(|r: &ObjectRecord| r.key.clone())
        } else {
            None
        };
        debug!(bucket, prefix, objects = objects.len(), more, "listed page");
        Ok(ListPage { objects, next_token })
    }

    async fn head(&self, bucket: &str, key: &str) -> Result<Option<ObjectRecord>, SourceError> {
        let store = self.store_for(bucket)?;
        let location =
            Path::parse(key).map_err(|e| SourceError::Fatal(format!("bad key {key:?}: {e}")))?;
        match store.head(&location).await {
            Ok(meta) => Ok(Some(to_record(meta))),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(classify(e)),
        }
    }
}

/// `object_store` prefixes match whole path segments, so list the deepest
/// directory containing `prefix` and filter the remainder by string.
fn list_scope(prefix: &str) -> Option<Path> {
    match prefix.rsplit_once('/') {
        Some((dir, _)) if !dir.is_empty() => Some(Path::from(dir)),
        _ => None,
    }
}

fn to_record(meta: ObjectMeta) -> ObjectRecord {
    let content_hash = meta
        .e_tag
        .as_deref()
        .or(meta.version.as_deref())
        .map(|tag| tag.trim_matches('"').to_string())
        .unwrap_or_else(|| format!("mtime:{}", meta.last_modified.to_rfc3339()));
    ObjectRecord::new(
        meta.location.to_string(),
        meta.size as u64,
        content_hash,
        meta.last_modified,
    )
}

/// Map an `object_store` failure to the watcher's two-way classification.
pub(crate) fn classify(err: object_store::Error) -> SourceError {
    let message = err.to_string();
    match err {
        object_store::Error::NotFound { .. } | object_store::Error::InvalidPath { .. } => {
            SourceError::Fatal(message)
        }
        _ if looks_fatal(&message) => SourceError::Fatal(message),
        _ => SourceError::Transient(message),
    }
}

fn looks_fatal(message: &str) -> bool {
    const FATAL_MARKERS: &[&str] = &[
        "nosuchbucket",
        "bucket not found",
        "accessdenied",
        "access denied",
        "permission denied",
        "forbidden",
        "unauthorized",
        "unauthenticated",
        "invalidaccesskeyid",
        "signaturedoesnotmatch",
        "status: 401",
        "status: 403",
        "404 not found",
    ];
    let lower = message.to_ascii_lowercase();
    FATAL_MARKERS.iter().any(|marker| lower.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lister::Lister;
    use bw_types::WatchTarget;

    async fn seeded(keys: &[&str]) -> ObjectStoreSource {
        let source = ObjectStoreSource::in_memory(["bucket"]);
        let store = source.store("bucket").unwrap().clone();
        for key in keys {
            store
                .put(&Path::from(*key), b"payload".to_vec().into())
                .await
                .unwrap();
        }
        source
    }

    #[tokio::test]
    async fn lists_all_pages_through_offsets() {
        let keys = ["scans/a.pdf", "scans/b.pdf", "scans/c.pdf", "scans/d.pdf", "scans/e.pdf"];
        let source = seeded(&keys).await.with_page_size(Some(2));

        let first = source.list_page("bucket", "scans/", None).await.unwrap();
        assert_eq!(first.objects.len(), 2);
        assert_eq!(first.next_token.as_deref(), Some("scans/b.pdf"));

        let snapshot = Lister::new(Arc::new(source))
            .list(&WatchTarget::new("bucket", "scans/"))
            .await
            .unwrap();
        assert_eq!(snapshot.keys().collect::<Vec<_>>(), keys.to_vec());
    }

    #[tokio::test]
    async fn prefix_is_matched_literally() {
        let source = seeded(&["scans/a1", "scans/a2", "scans/b1", "other"]).await;
        let page = source.list_page("bucket", "scans/a", None).await.unwrap();
        let keys: Vec<_> = page.objects.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["scans/a1", "scans/a2"]);
    }

    #[tokio::test]
    async fn rewrite_changes_content_hash() {
        let source = seeded(&["k"]).await;
        let before = source.head("bucket", "k").await.unwrap().unwrap();
        let store = source.store("bucket").unwrap().clone();
        store.put(&Path::from("k"), b"other".to_vec().into()).await.unwrap();
        let after = source.head("bucket", "k").await.unwrap().unwrap();
        assert!(!before.same_content(&after));
    }

    #[tokio::test]
    async fn head_of_missing_key_is_none() {
        let source = seeded(&[]).await;
        assert!(source.head("bucket", "absent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unconfigured_bucket_is_fatal() {
        let source = seeded(&[]).await;
        let err = source.list_page("elsewhere", "", None).await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn local_directory_lists_in_one_page() {
        let dir = tempfile::tempdir().unwrap();
        let bucket = dir.path().join("bucket");
        std::fs::create_dir_all(bucket.join("scans")).unwrap();
        std::fs::write(bucket.join("scans/a.pdf"), b"a").unwrap();
        std::fs::write(bucket.join("scans/b.pdf"), b"bb").unwrap();

        let source = ObjectStoreSource::local(dir.path(), ["bucket"]).unwrap();
        let page = source.list_page("bucket", "scans/", None).await.unwrap();
        assert_eq!(page.objects.len(), 2);
        assert!(page.next_token.is_none());
    }

    #[test]
    fn missing_local_bucket_directory_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = ObjectStoreSource::local(dir.path(), ["absent"]).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn scope_is_deepest_directory() {
        assert_eq!(list_scope(""), None);
        assert_eq!(list_scope("scans"), None);
        assert_eq!(list_scope("scans/"), Some(Path::from("scans")));
        assert_eq!(list_scope("a/b/c"), Some(Path::from("a/b")));
    }

    #[test]
    fn classification_by_message() {
        assert!(looks_fatal("Error performing list request: AccessDenied"));
        assert!(looks_fatal("NoSuchBucket: The specified bucket does not exist"));
        assert!(!looks_fatal("connection reset by peer"));
        assert!(!looks_fatal("Server returned status: 503 Service Unavailable"));
    }

    #[test]
    fn not_found_is_fatal_for_listing() {
        let err = object_store::Error::NotFound {
            path: "bucket".into(),
            source: "missing".into(),
        };
        assert!(classify(err).is_fatal());
    }
}
