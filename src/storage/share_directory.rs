//! Read access to share-link and folder resources
//!
//! Share links and folders are owned by the sharing side of the product; this
//! crate only reads them (and bumps the rollup counters on share links).

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::storage::{DocumentStore, Query};

pub const SHARE_LINKS: &str = "share_links";
pub const FOLDERS: &str = "folders";

/// Field on a share link naming the user who created it.
pub const OWNER_FIELD: &str = "createdBy";
pub const FOLDER_FIELD: &str = "folderId";
pub const REVOKED_FIELD: &str = "revoked";
pub const DELETED_FIELD: &str = "deleted";

pub const VIEW_COUNT_FIELD: &str = "viewCount";
pub const DOWNLOAD_COUNT_FIELD: &str = "downloadCount";
pub const UPDATED_AT_FIELD: &str = "updatedAt";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareLinkRef {
    pub link_id: String,
    pub folder_id: Option<String>,
    pub revoked: bool,
}

#[async_trait]
pub trait ShareDirectory: Send + Sync {
    /// Owner of the link, `None` if the link or its owner is unknown
    async fn resolve_owner(&self, link_id: &str) -> Result<Option<String>>;

    /// Every link created by the owner, revoked ones included
    async fn list_links_for_owner(&self, owner_id: &str) -> Result<Vec<ShareLinkRef>>;

    async fn is_folder_deleted(&self, folder_id: &str) -> Result<bool>;
}

/// [`ShareDirectory`] backed by the `share_links` and `folders` collections.
pub struct StoreShareDirectory {
    store: Arc<dyn DocumentStore>,
}

impl StoreShareDirectory {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

fn string_field(data: &serde_json::Map<String, Value>, field: &str) -> Option<String> {
    data.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl ShareDirectory for StoreShareDirectory {
    async fn resolve_owner(&self, link_id: &str) -> Result<Option<String>> {
        let link = self.store.get(SHARE_LINKS, link_id).await?;
        Ok(link.and_then(|data| string_field(&data, OWNER_FIELD)))
    }

    async fn list_links_for_owner(&self, owner_id: &str) -> Result<Vec<ShareLinkRef>> {
        let rows = self
            .store
            .query(&Query::collection(SHARE_LINKS).where_eq(OWNER_FIELD, owner_id))
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| ShareLinkRef {
                folder_id: string_field(&row.data, FOLDER_FIELD),
                revoked: row
                    .data
                    .get(REVOKED_FIELD)
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
                link_id: row.id,
            })
            .collect())
    }

    async fn is_folder_deleted(&self, folder_id: &str) -> Result<bool> {
        // A folder document that no longer exists is as unreachable as a
        // soft-deleted one.
        let folder = self.store.get(FOLDERS, folder_id).await?;
        Ok(match folder {
            Some(data) => data
                .get(DELETED_FIELD)
                .and_then(Value::as_bool)
                .unwrap_or(false),
            None => true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use serde_json::json;

    async fn seeded() -> StoreShareDirectory {
        let store = Arc::new(MemoryStore::new());
        let put = |id: &'static str, collection: &'static str, value: Value| {
            let store = Arc::clone(&store);
            async move {
                store
                    .put(collection, id, value.as_object().cloned().unwrap())
                    .await
                    .unwrap();
            }
        };

        put("L1", SHARE_LINKS, json!({"createdBy": "U1", "folderId": "F1"})).await;
        put(
            "L2",
            SHARE_LINKS,
            json!({"createdBy": "U1", "folderId": "F2", "revoked": true}),
        )
        .await;
        put("L3", SHARE_LINKS, json!({"createdBy": "U2", "folderId": "F1"})).await;
        put("F1", FOLDERS, json!({"deleted": false})).await;
        put("F2", FOLDERS, json!({"deleted": true})).await;

        StoreShareDirectory::new(store)
    }

    #[tokio::test]
    async fn test_resolve_owner() {
        let directory = seeded().await;
        assert_eq!(
            directory.resolve_owner("L1").await.unwrap(),
            Some("U1".to_string())
        );
        assert_eq!(directory.resolve_owner("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_list_links_includes_revoked() {
        let directory = seeded().await;
        let mut links = directory.list_links_for_owner("U1").await.unwrap();
        links.sort_by(|a, b| a.link_id.cmp(&b.link_id));

        assert_eq!(links.len(), 2);
        assert_eq!(links[0].link_id, "L1");
        assert!(!links[0].revoked);
        assert_eq!(links[1].link_id, "L2");
        assert!(links[1].revoked);
        assert_eq!(links[1].folder_id.as_deref(), Some("F2"));
    }

    #[tokio::test]
    async fn test_folder_deletion_state() {
        let directory = seeded().await;
        assert!(!directory.is_folder_deleted("F1").await.unwrap());
        assert!(directory.is_folder_deleted("F2").await.unwrap());
        assert!(directory.is_folder_deleted("gone").await.unwrap());
    }
}
