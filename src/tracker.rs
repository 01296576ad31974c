//! Entry point wiring the recorder and the read paths to one store
//!
//! Handlers and the admin CLI go through [`AccessTracker`] so that window
//! defaults and bounds are applied in one place.

use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::analytics::models::{AccessEventInput, EventDetails, EventDto, LegacyActivity, TimeSeriesPoint};
use crate::analytics::{
    CounterTotals, EventRecorder, LinkAnalytics, LiveVisitors, OwnerFeed, VisitorIdentity,
};
use crate::clock::Clock;
use crate::storage::{DocumentStore, ShareDirectory, StoreResult};

pub const DEFAULT_TIME_SERIES_DAYS: u32 = 7;
pub const DEFAULT_FEED_DAYS: u32 = 30;
pub const DEFAULT_LIVE_MINUTES: u32 = 5;

const MAX_DAYS: u32 = 365;
const MAX_MINUTES: u32 = 24 * 60;

/// `days` bounded to 1..=365
pub fn clamp_days(days: u32) -> u32 {
    days.clamp(1, MAX_DAYS)
}

/// `minutes` bounded to one day
pub fn clamp_minutes(minutes: u32) -> u32 {
    minutes.clamp(1, MAX_MINUTES)
}

/// Totals of an owner's feed
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerSummary {
    pub events: usize,
    pub views: usize,
    pub downloads: usize,
    pub links: usize,
    pub unique_visitors: usize,
}

pub struct AccessTracker {
    recorder: EventRecorder,
    links: LinkAnalytics,
    owners: OwnerFeed,
    live: LiveVisitors,
}

impl AccessTracker {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        directory: Arc<dyn ShareDirectory>,
        identity: Arc<dyn VisitorIdentity>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            recorder: EventRecorder::new(
                Arc::clone(&store),
                Arc::clone(&directory),
                identity,
                Arc::clone(&clock),
            ),
            links: LinkAnalytics::new(Arc::clone(&store), Arc::clone(&clock)),
            owners: OwnerFeed::new(Arc::clone(&store), directory, Arc::clone(&clock)),
            live: LiveVisitors::new(store, clock),
        }
    }

    pub fn with_live_fallback_limit(mut self, limit: usize) -> Self {
        self.live = self.live.with_fallback_limit(limit);
        self
    }

    pub async fn record(&self, input: AccessEventInput) -> StoreResult<String> {
        self.recorder.record(input).await
    }

    #[allow(deprecated)]
    pub async fn track_link_activity(
        &self,
        link_id: &str,
        activity: LegacyActivity,
        client_ip: Option<String>,
        details: EventDetails,
    ) -> StoreResult<String> {
        self.recorder
            .track_link_activity(link_id, activity, client_ip, details)
            .await
    }

    pub async fn reconcile_counters(&self, link_id: &str) -> StoreResult<CounterTotals> {
        self.recorder.reconcile_counters(link_id).await
    }

    pub async fn time_series(&self, link_id: &str, days: Option<u32>) -> Vec<TimeSeriesPoint> {
        let days = clamp_days(days.unwrap_or(DEFAULT_TIME_SERIES_DAYS));
        self.links.time_series(link_id, days).await
    }

    pub async fn enriched_feed(&self, link_id: &str, days: Option<u32>) -> Vec<EventDto> {
        let days = clamp_days(days.unwrap_or(DEFAULT_FEED_DAYS));
        self.links.enriched_feed(link_id, days).await
    }

    pub async fn owner_feed(&self, owner_id: &str, days: Option<u32>) -> Vec<EventDto> {
        let days = clamp_days(days.unwrap_or(DEFAULT_FEED_DAYS));
        self.owners.owner_feed(owner_id, days).await
    }

    /// [`Self::owner_feed`] bounded by `deadline`; empty if it runs out
    pub async fn owner_feed_within(
        &self,
        owner_id: &str,
        days: Option<u32>,
        deadline: Duration,
    ) -> Vec<EventDto> {
        match tokio::time::timeout(deadline, self.owner_feed(owner_id, days)).await {
            Ok(events) => events,
            Err(_) => {
                warn!(owner_id, ?deadline, "owner feed timed out");
                Vec::new()
            }
        }
    }

    pub async fn live_visitors(&self, owner_id: &str, minutes: Option<u32>) -> Vec<EventDto> {
        let minutes = clamp_minutes(minutes.unwrap_or(DEFAULT_LIVE_MINUTES));
        self.live.live_visitors(owner_id, minutes).await
    }

    pub async fn owner_summary(&self, owner_id: &str, days: Option<u32>) -> OwnerSummary {
        let events = self.owner_feed(owner_id, days).await;

        let mut links = std::collections::HashSet::new();
        let mut visitors = std::collections::HashSet::new();
        let mut summary = OwnerSummary {
            events: events.len(),
            ..OwnerSummary::default()
        };
        for event in &events {
            if event.event_type.is_view() {
                summary.views += 1;
            } else if event.event_type.is_download() {
                summary.downloads += 1;
            }
            links.insert(event.link_id.as_str());
            if !event.visitor_id_stable.is_empty() {
                visitors.insert(event.visitor_id_stable.as_str());
            }
        }
        summary.links = links.len();
        summary.unique_visitors = visitors.len();
        summary
    }
}
