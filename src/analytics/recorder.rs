//! The single write path for access events

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::analytics::models::{
    bucket_keys, AccessEventInput, AccessEventRecord, EventDetails, EventType, LegacyActivity,
};
use crate::analytics::{VisitorIdentity, ACCESS_EVENTS, EVENT_TYPE_FIELD, LINK_ID_FIELD};
use crate::clock::Clock;
use crate::storage::share_directory::{
    DOWNLOAD_COUNT_FIELD, SHARE_LINKS, UPDATED_AT_FIELD, VIEW_COUNT_FIELD,
};
use crate::storage::{
    DocumentStore, FieldOp, Query, ShareDirectory, StoreError, StoreResult,
};

/// Address input used for pseudonyms when the caller has no client address
const UNKNOWN_ADDRESS: &str = "unknown";

/// View and download totals recounted from the event log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CounterTotals {
    pub views: i64,
    pub downloads: i64,
}

pub struct EventRecorder {
    store: Arc<dyn DocumentStore>,
    directory: Arc<dyn ShareDirectory>,
    identity: Arc<dyn VisitorIdentity>,
    clock: Arc<dyn Clock>,
}

/// Rollup counter bumped by an event type, if any
fn counter_field(event_type: EventType) -> Option<&'static str> {
    match event_type {
        EventType::OpenShare => Some(VIEW_COUNT_FIELD),
        EventType::DownloadFile => Some(DOWNLOAD_COUNT_FIELD),
        _ => None,
    }
}

fn to_document(record: &AccessEventRecord) -> StoreResult<crate::storage::Document> {
    match serde_json::to_value(record).map_err(|e| StoreError::Other(e.into()))? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Other(anyhow::anyhow!(
            "event serialized to a non-object: {other}"
        ))),
    }
}

impl EventRecorder {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        directory: Arc<dyn ShareDirectory>,
        identity: Arc<dyn VisitorIdentity>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            directory,
            identity,
            clock,
        }
    }

    /// Persist one access event and bump the link's rollup counter.
    ///
    /// Returns the id of the new event. Fails only if the event itself could
    /// not be written; owner lookup and counter failures are logged and
    /// otherwise ignored.
    pub async fn record(&self, input: AccessEventInput) -> StoreResult<String> {
        let now = self.clock.now();
        let (date, hour, minute) = bucket_keys(now);
        let event_type = input.event_type.canonical();

        let address = input
            .client_ip
            .as_deref()
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
            .unwrap_or(UNKNOWN_ADDRESS);
        let user_agent = input.details.user_agent.as_deref().unwrap_or_default();

        let visitor_id = input
            .visitor_id
            .unwrap_or_else(|| self.identity.rotating_visitor_id(address, user_agent, now));
        let visitor_id_stable = input
            .visitor_id_stable
            .unwrap_or_else(|| self.identity.stable_visitor_id(address, user_agent));
        let ip_hash = self.identity.hash_address(address);

        let owner_id = match self.directory.resolve_owner(&input.link_id).await {
            Ok(owner) => owner,
            Err(err) => {
                warn!(link_id = %input.link_id, error = %err, "failed to resolve link owner, recording event without owner");
                None
            }
        };

        let mut details: EventDetails = input.details;
        if details.referer_category.is_none() {
            if let Some(referer) = details.referer.as_deref() {
                details.referer_category = self.identity.categorize_referer(referer);
            }
        }

        let record = AccessEventRecord {
            link_id: input.link_id,
            owner_id,
            event_type,
            visitor_id,
            visitor_id_stable,
            ip_hash,
            timestamp: now,
            date,
            hour,
            minute,
            details,
        };

        let event_id = match self.store.create(ACCESS_EVENTS, to_document(&record)?).await {
            Ok(id) => id,
            Err(err) => {
                error!(link_id = %record.link_id, event_type = %event_type, error = %err, "failed to persist access event");
                return Err(err);
            }
        };

        if let Some(field) = counter_field(event_type) {
            let ops = [
                FieldOp::Increment(field.to_string(), 1),
                FieldOp::Set(
                    UPDATED_AT_FIELD.to_string(),
                    Value::from(now.timestamp_millis()),
                ),
            ];
            if let Err(err) = self.store.update(SHARE_LINKS, &record.link_id, &ops).await {
                warn!(link_id = %record.link_id, counter = field, error = %err, "failed to increment link counter");
            }
        }

        debug!(link_id = %record.link_id, event_id = %event_id, event_type = %event_type, "recorded access event");
        Ok(event_id)
    }

    /// Record a `VIEW` / `DOWNLOAD` from callers that predate [`EventType`]
    #[deprecated(note = "use `record` with an explicit EventType")]
    pub async fn track_link_activity(
        &self,
        link_id: &str,
        activity: LegacyActivity,
        client_ip: Option<String>,
        details: EventDetails,
    ) -> StoreResult<String> {
        let mut input = AccessEventInput::new(link_id, activity.into()).with_details(details);
        input.client_ip = client_ip;
        self.record(input).await
    }

    /// Recount a link's views and downloads from the event log and raise its
    /// counters to at least those totals.
    ///
    /// Counters only ever grow, so increments lost to earlier failures are
    /// restored while counts from concurrent writers are never undone.
    pub async fn reconcile_counters(&self, link_id: &str) -> StoreResult<CounterTotals> {
        let rows = self
            .store
            .query(&Query::collection(ACCESS_EVENTS).where_eq(LINK_ID_FIELD, link_id))
            .await?;

        let mut totals = CounterTotals::default();
        for row in rows {
            let Some(event_type) = row
                .data
                .get(EVENT_TYPE_FIELD)
                .cloned()
                .and_then(|v| serde_json::from_value::<EventType>(v).ok())
            else {
                continue;
            };
            if event_type.is_view() {
                totals.views += 1;
            } else if event_type.is_download() {
                totals.downloads += 1;
            }
        }

        self.store
            .update(
                SHARE_LINKS,
                link_id,
                &[
                    FieldOp::Max(VIEW_COUNT_FIELD.to_string(), totals.views),
                    FieldOp::Max(DOWNLOAD_COUNT_FIELD.to_string(), totals.downloads),
                    FieldOp::Set(
                        UPDATED_AT_FIELD.to_string(),
                        Value::from(self.clock.now().timestamp_millis()),
                    ),
                ],
            )
            .await?;

        Ok(totals)
    }
}
