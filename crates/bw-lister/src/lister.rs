//! Paginated listing into a complete snapshot.

use std::collections::HashSet;
use std::sync::Arc;

use bw_types::{ObjectRecord, Snapshot, WatchTarget};
use chrono::Utc;
use tracing::{debug, warn};

use crate::error::{ListError, ListResult};
use crate::filter::KeyFilter;
use crate::source::ObjectSource;

/// Upper bound on pages fetched for one listing.
pub const DEFAULT_MAX_PAGES: usize = 100_000;

/// Lists watch targets through an [`ObjectSource`].
#[derive(Clone)]
pub struct Lister {
    source: Arc<dyn ObjectSource>,
    filter: KeyFilter,
    max_pages: usize,
}

impl Lister {
    pub fn new(source: Arc<dyn ObjectSource>) -> Self {
        Self {
            source,
            filter: KeyFilter::all(),
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    pub fn with_filter(mut self, filter: KeyFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    pub fn filter(&self) -> &KeyFilter {
        &self.filter
    }

    /// Produce the complete current snapshot of `target`.
    ///
    /// Pages are fetched until the source reports no continuation token.
    /// The snapshot is stamped with the time listing started. Any page
    /// failure fails the whole listing.
    pub async fn list(&self, target: &WatchTarget) -> ListResult<Snapshot> {
        let mut snapshot = Snapshot::new(target.clone(), Utc::now());
        let mut seen_tokens: HashSet<String> = HashSet::new();
        let mut token: Option<String> = None;
        let mut pages = 0usize;
        let mut filtered = 0usize;

        loop {
            if pages >= self.max_pages {
                return Err(ListError::TooManyPages {
                    target: target.clone(),
                    limit: self.max_pages,
                });
            }

            let page = self
                .source
                .list_page(&target.bucket, &target.prefix, token.as_deref())
                .await
                .map_err(|e| ListError::from_source(target, e))?;
            pages += 1;

            for record in page.objects {
                if !self.keep(target, &record) {
                    filtered += 1;
                    continue;
                }
                let key = record.key.clone();
                if snapshot.upsert(record).is_some() {
                    warn!(watch = %target, key = %key, "key listed twice; keeping the later record");
                }
            }

            match page.next_token {
                None => break,
                Some(next) => {
                    if !seen_tokens.insert(next.clone()) {
                        return Err(ListError::PaginationLoop {
                            target: target.clone(),
                            token: next,
                        });
                    }
                    token = Some(next);
                }
            }
        }

        debug!(
            watch = %target,
            pages,
            objects = snapshot.len(),
            filtered,
            "listing complete"
        );
        Ok(snapshot)
    }

    /// Metadata for one key of `target`, if it exists and passes the filter.
    pub async fn head(&self, target: &WatchTarget, key: &str) -> ListResult<Option<ObjectRecord>> {
        let record = self
            .source
            .head(&target.bucket, key)
            .await
            .map_err(|e| ListError::from_source(target, e))?;
        Ok(record.filter(|r| self.keep(target, r)))
    }

    fn keep(&self, target: &WatchTarget, record: &ObjectRecord) -> bool {
        record.key.starts_with(&target.prefix) && self.filter.accepts(&record.key)
    }
}

impl std::fmt::Debug for Lister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lister")
            .field("filter", &self.filter)
            .field("max_pages", &self.max_pages)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;
    use crate::memory::InMemorySource;
    use crate::source::ListPage;
    use async_trait::async_trait;
    use chrono::DateTime;
    use std::sync::Mutex;

    fn rec(key: &str, hash: &str) -> ObjectRecord {
        ObjectRecord::new(key, 1, hash, DateTime::<Utc>::from_timestamp(0, 0).unwrap())
    }

    fn target() -> WatchTarget {
        WatchTarget::new("bucket", "scans/")
    }

    /// Replays a fixed list of pages regardless of the token passed in.
    struct ScriptedSource {
        pages: Mutex<Vec<ListPage>>,
    }

    impl ScriptedSource {
        fn new(mut pages: Vec<ListPage>) -> Self {
            pages.reverse();
            Self {
                pages: Mutex::new(pages),
            }
        }
    }

    #[async_trait]
    impl ObjectSource for ScriptedSource {
        async fn list_page(
            &self,
            _bucket: &str,
            _prefix: &str,
            _token: Option<&str>,
        ) -> Result<ListPage, SourceError> {
            self.pages
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| SourceError::Transient("script exhausted".into()))
        }

        async fn head(&self, _bucket: &str, _key: &str) -> Result<Option<ObjectRecord>, SourceError> {
            Ok(None)
        }
    }

    fn page(keys: &[&str], next: Option<&str>) -> ListPage {
        ListPage {
            objects: keys.iter().map(|k| rec(k, "h")).collect(),
            next_token: next.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn paginates_until_exhausted() {
        let source = Arc::new(InMemorySource::new(2));
        for i in 0..5 {
            source.put("bucket", rec(&format!("scans/{i}.pdf"), "h"));
        }
        source.put("bucket", rec("other/x.pdf", "h"));

        let lister = Lister::new(source.clone());
        let snapshot = lister.list(&target()).await.unwrap();

        assert_eq!(snapshot.len(), 5);
        assert_eq!(snapshot.target(), &target());
        assert_eq!(source.list_calls(), 3);
    }

    #[tokio::test]
    async fn empty_bucket_gives_empty_snapshot() {
        let source = Arc::new(InMemorySource::default());
        source.create_bucket("bucket");
        let snapshot = Lister::new(source).list(&target()).await.unwrap();
        assert!(snapshot.is_empty());
    }

    #[tokio::test]
    async fn failure_mid_listing_is_not_partial_success() {
        let source = Arc::new(ScriptedSource::new(vec![page(&["scans/a"], Some("t1"))]));
        let err = Lister::new(source).list(&target()).await.unwrap_err();
        assert!(matches!(err, ListError::TransientFetch { .. }));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn missing_bucket_is_fatal() {
        let source = Arc::new(InMemorySource::default());
        let err = Lister::new(source).list(&target()).await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(err.target(), &target());
    }

    #[tokio::test]
    async fn repeated_token_is_detected() {
        let source = Arc::new(ScriptedSource::new(vec![
            page(&["scans/a"], Some("t1")),
            page(&["scans/b"], Some("t1")),
        ]));
        let err = Lister::new(source).list(&target()).await.unwrap_err();
        assert!(matches!(err, ListError::PaginationLoop { ref token, .. } if token == "t1"));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn page_budget_is_enforced() {
        let source = Arc::new(ScriptedSource::new(vec![
            page(&["scans/a"], Some("t1")),
            page(&["scans/b"], Some("t2")),
            page(&["scans/c"], None),
        ]));
        let err = Lister::new(source)
            .with_max_pages(2)
            .list(&target())
            .await
            .unwrap_err();
        assert!(matches!(err, ListError::TooManyPages { limit: 2, .. }));
    }

    #[tokio::test]
    async fn duplicate_key_keeps_later_record() {
        let source = Arc::new(ScriptedSource::new(vec![
            ListPage {
                objects: vec![rec("scans/a", "old")],
                next_token: Some("t1".into()),
            },
            ListPage::last(vec![rec("scans/a", "new")]),
        ]));
        let snapshot = Lister::new(source).list(&target()).await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get("scans/a").unwrap().content_hash, "new");
    }

    #[tokio::test]
    async fn filter_drops_markers_and_foreign_suffixes() {
        let source = Arc::new(InMemorySource::default());
        for key in ["scans/", "scans/a.pdf", "scans/b.txt"] {
            source.put("bucket", rec(key, "h"));
        }
        let lister = Lister::new(source).with_filter(KeyFilter::suffixes([".pdf"]));
        let snapshot = lister.list(&target()).await.unwrap();
        assert_eq!(snapshot.keys().collect::<Vec<_>>(), vec!["scans/a.pdf"]);
    }

    #[tokio::test]
    async fn head_applies_filter() {
        let source = Arc::new(InMemorySource::default());
        source.put("bucket", rec("scans/a.txt", "h"));
        let lister = Lister::new(source).with_filter(KeyFilter::suffixes([".pdf"]));
        assert!(lister.head(&target(), "scans/a.txt").await.unwrap().is_none());
    }
}
