//! Share-link access analytics
//!
//! One write path ([`EventRecorder`]) appends immutable access events and
//! maintains the rollup counters on share links. Three read paths answer
//! dashboard queries and never fail: per-link series and feeds
//! ([`LinkAnalytics`]), the merged feed across an owner's links
//! ([`OwnerFeed`]) and the last-minutes window of visitors ([`LiveVisitors`]).
//! Read paths that need a composite index fall back to index-free queries
//! plus in-memory sorting when the store reports the index as missing.

pub mod aggregator;
pub mod identity;
pub mod ip_extractor;
pub mod live;
pub mod models;
pub mod owner_feed;
pub mod recorder;

pub use aggregator::LinkAnalytics;
pub use identity::{HmacVisitorIdentity, VisitorIdentity};
pub use ip_extractor::extract_client_ip;
pub use live::LiveVisitors;
pub use models::{
    AccessEventInput, AccessEventRecord, DenialReason, EventDetails, EventDto, EventType,
    LegacyActivity, TimeSeriesPoint,
};
pub use owner_feed::OwnerFeed;
pub use recorder::{CounterTotals, EventRecorder};

use crate::storage::CompositeIndex;

/// Collection holding one document per access event
pub const ACCESS_EVENTS: &str = "access_events";

pub(crate) const LINK_ID_FIELD: &str = "linkId";
pub(crate) const OWNER_ID_FIELD: &str = "ownerId";
pub(crate) const EVENT_TYPE_FIELD: &str = "eventType";
pub(crate) const TIMESTAMP_FIELD: &str = "timestamp";

/// Composite indexes the analytics queries are written for
pub fn required_indexes() -> Vec<CompositeIndex> {
    vec![
        CompositeIndex::new(ACCESS_EVENTS, &[LINK_ID_FIELD, TIMESTAMP_FIELD]),
        CompositeIndex::new(
            ACCESS_EVENTS,
            &[OWNER_ID_FIELD, EVENT_TYPE_FIELD, TIMESTAMP_FIELD],
        ),
        CompositeIndex::new(ACCESS_EVENTS, &[OWNER_ID_FIELD, TIMESTAMP_FIELD]),
    ]
}
