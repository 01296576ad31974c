use crate::storage::{ShareDirectory, ShareLinkRef};
use anyhow::Result;
use async_trait::async_trait;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

/// Share directory wrapper that caches link ownership
///
/// The recorder resolves the owner of a link on every event, and a link's
/// owner never changes, so owner lookups are served from a Moka cache.
/// Folder state and link listings always go to the underlying directory.
pub struct CachedShareDirectory {
    /// Underlying directory implementation
    inner: Arc<dyn ShareDirectory>,
    /// link id -> owner id (only successful lookups are cached)
    owner_cache: Cache<String, Option<String>>,
}

impl CachedShareDirectory {
    pub fn new(inner: Arc<dyn ShareDirectory>, max_entries: u64, ttl_secs: u64) -> Self {
        let owner_cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(Duration::from_secs(ttl_secs))
            .build();

        Self { inner, owner_cache }
    }

    /// Drop a cached owner, e.g. after the link was reassigned
    pub async fn invalidate(&self, link_id: &str) {
        self.owner_cache.invalidate(link_id).await;
    }
}

#[async_trait]
impl ShareDirectory for CachedShareDirectory {
    async fn resolve_owner(&self, link_id: &str) -> Result<Option<String>> {
        if let Some(cached) = self.owner_cache.get(link_id).await {
            return Ok(cached);
        }

        // Cache miss - errors are not cached so the next event retries
        let owner = self.inner.resolve_owner(link_id).await?;

        // Unknown links are not cached either; the link may be created shortly
        if owner.is_some() {
            self.owner_cache
                .insert(link_id.to_string(), owner.clone())
                .await;
        }

        Ok(owner)
    }

    async fn list_links_for_owner(&self, owner_id: &str) -> Result<Vec<ShareLinkRef>> {
        self.inner.list_links_for_owner(owner_id).await
    }

    async fn is_folder_deleted(&self, folder_id: &str) -> Result<bool> {
        self.inner.is_folder_deleted(folder_id).await
    }
}
