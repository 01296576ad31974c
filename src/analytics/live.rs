//! Who opened any of an owner's links in the last few minutes

use chrono::Duration;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::analytics::aggregator::{decode_rows, sort_newest_first, window_start};
use crate::analytics::models::{EventDto, EventType};
use crate::analytics::{ACCESS_EVENTS, EVENT_TYPE_FIELD, OWNER_ID_FIELD, TIMESTAMP_FIELD};
use crate::clock::Clock;
use crate::storage::{Direction, DocumentStore, Query, StoreError, StoredDocument};

/// Most events the live window ever returns
pub const LIVE_LIMIT: usize = 200;

/// Rows read by the ordered fallback scan before it widens to the whole window
pub const DEFAULT_FALLBACK_LIMIT: usize = 1000;

pub struct LiveVisitors {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    fallback_limit: usize,
}

impl LiveVisitors {
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            fallback_limit: DEFAULT_FALLBACK_LIMIT,
        }
    }

    pub fn with_fallback_limit(mut self, limit: usize) -> Self {
        self.fallback_limit = limit.max(LIVE_LIMIT);
        self
    }

    /// `OPEN_SHARE` events on any of the owner's links in the last `minutes`
    /// minutes, newest first, at most [`LIVE_LIMIT`].
    pub async fn live_visitors(&self, owner_id: &str, minutes: u32) -> Vec<EventDto> {
        let since = window_start(self.clock.now(), Duration::minutes(i64::from(minutes)));
        let query = Query::collection(ACCESS_EVENTS)
            .where_eq(OWNER_ID_FIELD, owner_id)
            .where_eq(EVENT_TYPE_FIELD, EventType::OpenShare.as_str())
            .where_gte(TIMESTAMP_FIELD, since)
            .order_by(TIMESTAMP_FIELD, Direction::Desc)
            .limit(LIVE_LIMIT);

        match self.store.query(&query).await {
            Ok(rows) => Self::finish(rows),
            Err(StoreError::IndexMissing { collection, fields }) => {
                warn!(
                    owner_id,
                    "live visitor query needs a composite index on {}({}); create it to avoid scanning",
                    collection,
                    fields.join(", ")
                );
                self.relaxed(owner_id, since).await
            }
            Err(e) => {
                warn!(owner_id, error = %e, "live visitor query failed");
                Vec::new()
            }
        }
    }

    /// Owner and time filter only, newest first. Event type and cap are
    /// applied here.
    ///
    /// The scan is capped at `fallback_limit` rows. A capped scan that fills
    /// up without yielding [`LIVE_LIMIT`] opens may have cut off older opens,
    /// so it is widened to the whole window.
    async fn relaxed(&self, owner_id: &str, since: i64) -> Vec<EventDto> {
        let query = Query::collection(ACCESS_EVENTS)
            .where_eq(OWNER_ID_FIELD, owner_id)
            .where_gte(TIMESTAMP_FIELD, since)
            .order_by(TIMESTAMP_FIELD, Direction::Desc)
            .limit(self.fallback_limit);

        match self.store.query(&query).await {
            Ok(rows) => {
                let saturated = rows.len() >= self.fallback_limit;
                let events = Self::finish(rows);
                if !saturated || events.len() >= LIVE_LIMIT {
                    return events;
                }
                debug!(
                    owner_id,
                    limit = self.fallback_limit,
                    "live visitor fallback hit its scan limit, widening"
                );
                self.unbounded(owner_id, since).await
            }
            Err(StoreError::IndexMissing { collection, fields }) => {
                warn!(
                    owner_id,
                    "live visitor fallback needs a composite index on {}({}); scanning the whole window",
                    collection,
                    fields.join(", ")
                );
                self.unbounded(owner_id, since).await
            }
            Err(e) => {
                warn!(owner_id, error = %e, "live visitor fallback query failed");
                Vec::new()
            }
        }
    }

    /// Every owner event in the window, unordered and unlimited
    async fn unbounded(&self, owner_id: &str, since: i64) -> Vec<EventDto> {
        let query = Query::collection(ACCESS_EVENTS)
            .where_eq(OWNER_ID_FIELD, owner_id)
            .where_gte(TIMESTAMP_FIELD, since);

        match self.store.query(&query).await {
            Ok(rows) => Self::finish(rows),
            Err(e) => {
                warn!(owner_id, error = %e, "live visitor window scan failed");
                Vec::new()
            }
        }
    }

    /// Filter to opens, sort newest first, then cap
    fn finish(rows: Vec<StoredDocument>) -> Vec<EventDto> {
        let mut events: Vec<EventDto> = decode_rows(rows)
            .into_iter()
            .filter(|(_, record)| record.event_type == EventType::OpenShare)
            .map(|(id, record)| EventDto::from_record(id, record))
            .collect();
        sort_newest_first(&mut events);
        events.truncate(LIVE_LIMIT);
        events
    }
}
