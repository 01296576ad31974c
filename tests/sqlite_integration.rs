//! End-to-end runs of the tracker against the SQLite store

mod common;

use chrono::Duration;
use common::{harness, Harness};
use serde_json::Value;
use sharetrail::analytics::models::{AccessEventInput, EventDetails, EventType};
use sharetrail::storage::share_directory::SHARE_LINKS;
use sharetrail::storage::{DocumentStore, SqliteStore};
use std::sync::Arc;

async fn sqlite_harness() -> Harness {
    // One connection: every connection to sqlite::memory: is its own database
    let store = SqliteStore::new("sqlite::memory:", 1).await.unwrap();
    harness(Arc::new(store)).await
}

#[tokio::test]
async fn test_record_and_read_back() {
    let h = sqlite_harness().await;

    h.tracker
        .record(
            AccessEventInput::new("A", EventType::OpenShare)
                .with_client_ip("1.2.3.4")
                .with_details(EventDetails {
                    referer: Some("https://mail.google.com/".to_string()),
                    country: Some("DE".to_string()),
                    ..Default::default()
                }),
        )
        .await
        .unwrap();
    h.clock.advance(Duration::minutes(1));
    h.tracker
        .record(AccessEventInput::new("A", EventType::DownloadFile))
        .await
        .unwrap();

    let series = h.tracker.time_series("A", None).await;
    assert_eq!(series.len(), 1);
    assert_eq!((series[0].views, series[0].downloads), (1, 1));

    let feed = h.tracker.enriched_feed("A", None).await;
    assert_eq!(feed.len(), 2);
    assert_eq!(feed[0].event_type, EventType::DownloadFile);
    assert_eq!(feed[1].country.as_deref(), Some("DE"));
    assert_eq!(feed[1].referer_category.as_deref(), Some("email"));
    assert_eq!(feed[1].owner_id.as_deref(), Some("U1"));

    let link = h.store.get(SHARE_LINKS, "A").await.unwrap().unwrap();
    assert_eq!(link.get("viewCount").and_then(Value::as_i64), Some(1));
    assert_eq!(link.get("downloadCount").and_then(Value::as_i64), Some(1));
}

#[tokio::test]
async fn test_owner_feed_and_live_window() {
    let h = sqlite_harness().await;
    for link in ["A", "B", "C", "D"] {
        h.clock.advance(Duration::seconds(30));
        h.tracker
            .record(AccessEventInput::new(link, EventType::OpenShare))
            .await
            .unwrap();
    }

    let feed = h.tracker.owner_feed("U1", None).await;
    let links: Vec<&str> = feed.iter().map(|e| e.link_id.as_str()).collect();
    assert_eq!(links, vec!["B", "A"]);

    let live = h.tracker.live_visitors("U1", None).await;
    let links: Vec<&str> = live.iter().map(|e| e.link_id.as_str()).collect();
    assert_eq!(links, vec!["C", "B", "A"]);

    h.clock.advance(Duration::minutes(6));
    assert!(h.tracker.live_visitors("U1", None).await.is_empty());
}

#[tokio::test]
async fn test_reconcile_against_sqlite() {
    let h = sqlite_harness().await;
    for _ in 0..3 {
        h.tracker
            .record(AccessEventInput::new("D", EventType::OpenShare))
            .await
            .unwrap();
    }

    let totals = h.tracker.reconcile_counters("D").await.unwrap();
    assert_eq!((totals.views, totals.downloads), (3, 0));

    let link = h.store.get(SHARE_LINKS, "D").await.unwrap().unwrap();
    assert_eq!(link.get("viewCount").and_then(Value::as_i64), Some(3));
    assert_eq!(link.get("downloadCount").and_then(Value::as_i64), Some(0));
}
