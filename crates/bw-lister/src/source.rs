use async_trait::async_trait;
use bw_types::ObjectRecord;

use crate::error::SourceError;

/// One page of a provider listing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Objects on this page. Keys start with the requested prefix.
    pub objects: Vec<ObjectRecord>,
    /// Token for the next page; `None` once the listing is exhausted.
    pub next_token: Option<String>,
}

impl ListPage {
    /// The last page of a listing.
    pub fn last(objects: Vec<ObjectRecord>) -> Self {
        Self {
            objects,
            next_token: None,
        }
    }
}

/// Storage-access capability: the only provider operations the watcher
/// depends on.
///
/// Implementations are constructed explicitly and handed to the
/// [`Lister`](crate::Lister); there is no process-global client.
#[async_trait]
pub trait ObjectSource: Send + Sync {
    /// Fetch one page of objects under `prefix`, continuing from `token`.
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        token: Option<&str>,
    ) -> Result<ListPage, SourceError>;

    /// Fetch metadata for one object. `Ok(None)` if it does not exist.
    async fn head(&self, bucket: &str, key: &str) -> Result<Option<ObjectRecord>, SourceError>;
}
