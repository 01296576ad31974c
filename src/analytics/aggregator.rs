//! Per-link aggregation
//!
//! Reads never fail: store errors are logged and turn into empty results.
//! Ordered feed queries need a composite index on `(linkId, timestamp)`;
//! when the store reports it missing the query is retried unordered and
//! sorted in memory.

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::analytics::models::{AccessEventRecord, EventDto, TimeSeriesPoint};
use crate::analytics::{ACCESS_EVENTS, LINK_ID_FIELD, TIMESTAMP_FIELD};
use crate::clock::Clock;
use crate::storage::{Direction, DocumentStore, Query, StoreError, StoreResult, StoredDocument};

/// Start of a window reaching `span` back from `now`, in epoch milliseconds
pub(crate) fn window_start(now: DateTime<Utc>, span: Duration) -> i64 {
    (now - span).timestamp_millis()
}

/// Decode stored rows, skipping (and logging) rows that are not events
pub(crate) fn decode_rows(rows: Vec<StoredDocument>) -> Vec<(String, AccessEventRecord)> {
    rows.into_iter()
        .filter_map(|row| {
            match serde_json::from_value::<AccessEventRecord>(row.data.into()) {
                Ok(record) => Some((row.id, record)),
                Err(e) => {
                    warn!(event_id = %row.id, error = %e, "skipping undecodable access event");
                    None
                }
            }
        })
        .collect()
}

/// Newest first
pub(crate) fn sort_newest_first(events: &mut [EventDto]) {
    events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
}

/// Every event of one link written at or after `since`, newest first.
///
/// Falls back to an unordered query when the ordered one lacks its index.
/// Any other store failure is returned to the caller.
pub(crate) async fn fetch_link_feed(
    store: &dyn DocumentStore,
    link_id: &str,
    since: i64,
) -> StoreResult<Vec<EventDto>> {
    let query = Query::collection(ACCESS_EVENTS)
        .where_eq(LINK_ID_FIELD, link_id)
        .where_gte(TIMESTAMP_FIELD, since)
        .order_by(TIMESTAMP_FIELD, Direction::Desc);

    let rows = match store.query(&query).await {
        Ok(rows) => rows,
        Err(StoreError::IndexMissing { collection, fields }) => {
            debug!(
                link_id,
                collection = %collection,
                fields = %fields.join(","),
                "ordered feed query has no index, sorting in memory"
            );
            store.query(&query.without_order()).await?
        }
        Err(e) => return Err(e),
    };

    let mut events: Vec<EventDto> = decode_rows(rows)
        .into_iter()
        .map(|(id, record)| EventDto::from_record(id, record))
        .collect();
    sort_newest_first(&mut events);
    Ok(events)
}

/// Dashboard reads scoped to one share link
pub struct LinkAnalytics {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
}

impl LinkAnalytics {
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Daily views and downloads over the last `days` days, oldest first.
    ///
    /// Only days with at least one event appear.
    pub async fn time_series(&self, link_id: &str, days: u32) -> Vec<TimeSeriesPoint> {
        let since = window_start(self.clock.now(), Duration::days(i64::from(days)));
        let query = Query::collection(ACCESS_EVENTS)
            .where_eq(LINK_ID_FIELD, link_id)
            .where_gte(TIMESTAMP_FIELD, since)
            .order_by(TIMESTAMP_FIELD, Direction::Asc);

        let rows = match self.store.query(&query).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(link_id, error = %e, "time series query failed");
                return Vec::new();
            }
        };

        let mut buckets: BTreeMap<String, (u64, u64)> = BTreeMap::new();
        for (_, record) in decode_rows(rows) {
            let date = if record.date.is_empty() {
                record.timestamp.format("%Y-%m-%d").to_string()
            } else {
                record.date
            };
            let bucket = buckets.entry(date).or_default();
            if record.event_type.is_view() {
                bucket.0 += 1;
            } else if record.event_type.is_download() {
                bucket.1 += 1;
            }
        }

        buckets
            .into_iter()
            .map(|(date, (views, downloads))| TimeSeriesPoint {
                date,
                views,
                downloads,
            })
            .collect()
    }

    /// Every event of the link over the last `days` days, newest first
    pub async fn enriched_feed(&self, link_id: &str, days: u32) -> Vec<EventDto> {
        let since = window_start(self.clock.now(), Duration::days(i64::from(days)));
        match fetch_link_feed(self.store.as_ref(), link_id, since).await {
            Ok(events) => events,
            Err(e) => {
                warn!(link_id, error = %e, "enriched feed query failed");
                Vec::new()
            }
        }
    }
}
