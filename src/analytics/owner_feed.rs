//! Merged event feed across every link of one owner

use chrono::Duration;
use futures::future::join_all;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::analytics::aggregator::{fetch_link_feed, sort_newest_first, window_start};
use crate::analytics::models::EventDto;
use crate::clock::Clock;
use crate::storage::{DocumentStore, ShareDirectory, ShareLinkRef};

pub struct OwnerFeed {
    store: Arc<dyn DocumentStore>,
    directory: Arc<dyn ShareDirectory>,
    clock: Arc<dyn Clock>,
}

impl OwnerFeed {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        directory: Arc<dyn ShareDirectory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            directory,
            clock,
        }
    }

    /// Events of all the owner's links over the last `days` days, newest
    /// first.
    ///
    /// Revoked links still contribute; links whose folder is deleted do not.
    /// Links are queried concurrently and a link whose query fails is left
    /// out instead of failing the whole feed.
    pub async fn owner_feed(&self, owner_id: &str, days: u32) -> Vec<EventDto> {
        let links = match self.directory.list_links_for_owner(owner_id).await {
            Ok(links) => links,
            Err(e) => {
                warn!(owner_id, error = %e, "failed to list owner links");
                return Vec::new();
            }
        };

        let links = self.live_links(links).await;
        if links.is_empty() {
            return Vec::new();
        }

        let since = window_start(self.clock.now(), Duration::days(i64::from(days)));
        let store = self.store.as_ref();
        let results = join_all(
            links
                .iter()
                .map(|link| fetch_link_feed(store, &link.link_id, since)),
        )
        .await;

        let mut events = Vec::new();
        for (link, result) in links.iter().zip(results) {
            match result {
                Ok(link_events) => events.extend(link_events),
                Err(e) => {
                    warn!(owner_id, link_id = %link.link_id, error = %e, "skipping link in owner feed");
                }
            }
        }

        sort_newest_first(&mut events);
        debug!(owner_id, links = links.len(), events = events.len(), "built owner feed");
        events
    }

    /// Links whose folder still exists. Each folder is read once, and a
    /// folder whose state cannot be read keeps its links.
    async fn live_links(&self, links: Vec<ShareLinkRef>) -> Vec<ShareLinkRef> {
        let folders: BTreeSet<&str> = links
            .iter()
            .filter_map(|link| link.folder_id.as_deref())
            .collect();

        let checks = join_all(folders.into_iter().map(|folder_id| async move {
            match self.directory.is_folder_deleted(folder_id).await {
                Ok(deleted) => (folder_id, deleted),
                Err(e) => {
                    warn!(folder_id, error = %e, "failed to read folder state, keeping its links");
                    (folder_id, false)
                }
            }
        }))
        .await;

        let deleted: HashSet<String> = checks
            .into_iter()
            .filter_map(|(folder_id, deleted)| deleted.then(|| folder_id.to_string()))
            .collect();

        links
            .into_iter()
            .filter(|link| {
                link.folder_id
                    .as_ref()
                    .map_or(true, |folder_id| !deleted.contains(folder_id))
            })
            .collect()
    }
}
