//! Read paths: per-link series and feeds, owner feed, live window

mod common;

use chrono::Duration;
use common::{harness, memory_harness, start_time, FlakyStore, Harness};
use serde_json::{json, Value};
use sharetrail::analytics::live::DEFAULT_FALLBACK_LIMIT;
use sharetrail::analytics::models::{AccessEventInput, EventDetails, EventDto, EventType};
use sharetrail::analytics::{LiveVisitors, ACCESS_EVENTS};
use sharetrail::storage::{DocumentStore, MemoryStore, Query};
use std::sync::Arc;

async fn open(h: &Harness, link_id: &str) {
    h.tracker
        .record(AccessEventInput::new(link_id, EventType::OpenShare).with_client_ip("1.2.3.4"))
        .await
        .unwrap();
}

fn ids(events: &[EventDto]) -> Vec<String> {
    events.iter().map(|e| e.id.clone()).collect()
}

fn assert_newest_first(events: &[EventDto]) {
    assert!(events.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
}

#[tokio::test]
async fn test_single_open_gives_one_bucket_for_today() {
    let h = memory_harness().await;
    open(&h, "A").await;

    let series = h.tracker.time_series("A", Some(7)).await;
    assert_eq!(series.len(), 1);
    assert_eq!(series[0].date, start_time().format("%Y-%m-%d").to_string());
    assert_eq!(series[0].views, 1);
    assert_eq!(series[0].downloads, 0);
}

#[tokio::test]
async fn test_download_feed_entry_is_fully_populated() {
    let h = memory_harness().await;
    h.tracker
        .record(
            AccessEventInput::new("A", EventType::DownloadFile).with_details(EventDetails {
                file_id: Some("F1".to_string()),
                ..Default::default()
            }),
        )
        .await
        .unwrap();

    let feed = h.tracker.enriched_feed("A", Some(30)).await;
    assert_eq!(feed.len(), 1);

    let dto = serde_json::to_value(&feed[0]).unwrap();
    assert_eq!(dto["type"], json!("DOWNLOAD"));
    assert_eq!(dto["fileId"], json!("F1"));
    for field in ["country", "city", "referer", "denialReason", "previousIP", "fileName"] {
        assert_eq!(dto[field], Value::Null, "{field}");
    }
    for flag in ["isVPN", "isDatacenter", "invalidAttempt", "ipChanged", "isReshare", "js_seen"] {
        assert_eq!(dto[flag], json!(false), "{flag}");
    }
}

#[tokio::test]
async fn test_series_spans_days_and_skips_empty_ones() {
    let h = memory_harness().await;
    open(&h, "A").await;
    h.clock.advance(Duration::days(2));
    open(&h, "A").await;
    h.tracker
        .record(AccessEventInput::new("A", EventType::DownloadFile))
        .await
        .unwrap();

    let series = h.tracker.time_series("A", None).await;
    let dates: Vec<&str> = series.iter().map(|p| p.date.as_str()).collect();
    assert_eq!(dates, vec!["2024-03-10", "2024-03-12"]);
    assert_eq!((series[1].views, series[1].downloads), (1, 1));
}

#[tokio::test]
async fn test_feed_fallback_matches_indexed_path() {
    let indexed = memory_harness().await;
    let bare = harness(Arc::new(MemoryStore::new())).await;

    for h in [&indexed, &bare] {
        for (minutes, event_type) in [
            (0, EventType::LinkPreview),
            (1, EventType::OpenShare),
            (2, EventType::ViewFile),
            (3, EventType::DownloadFile),
        ] {
            h.clock.set(start_time() + Duration::minutes(minutes));
            h.tracker
                .record(AccessEventInput::new("A", event_type))
                .await
                .unwrap();
        }
    }

    let with_index = indexed.tracker.enriched_feed("A", None).await;
    let without_index = bare.tracker.enriched_feed("A", None).await;

    let kinds = |events: &[EventDto]| -> Vec<EventType> {
        events.iter().map(|e| e.event_type).collect()
    };
    assert_eq!(with_index.len(), 4);
    assert_eq!(kinds(&with_index), kinds(&without_index));
    assert_eq!(
        kinds(&with_index),
        vec![
            EventType::DownloadFile,
            EventType::ViewFile,
            EventType::OpenShare,
            EventType::LinkPreview
        ]
    );
}

#[tokio::test]
async fn test_owner_feed_survives_a_failing_link() {
    let flaky = Arc::new(FlakyStore::new(Arc::new(MemoryStore::with_required_indexes())));
    let h = harness(flaky.clone()).await;

    // Three reachable links for U9
    for (id, folder) in [("X", "F1"), ("Y", "F1"), ("Z", "F1")] {
        h.store
            .put(
                "share_links",
                id,
                common::doc(json!({"createdBy": "U9", "folderId": folder})),
            )
            .await
            .unwrap();
    }
    for (i, link) in ["X", "Y", "Z", "X", "Y", "Z"].iter().enumerate() {
        h.clock.set(start_time() + Duration::minutes(i as i64));
        open(&h, link).await;
    }

    flaky.fail_link("Y");
    let feed = h.tracker.owner_feed("U9", None).await;

    assert_eq!(feed.len(), 4);
    assert!(feed.iter().all(|e| e.link_id != "Y"));
    assert_newest_first(&feed);
}

#[tokio::test]
async fn test_owner_feed_excludes_deleted_folders_but_keeps_revoked_links() {
    let h = memory_harness().await;
    for link in ["A", "B", "C", "D"] {
        h.clock.advance(Duration::minutes(1));
        open(&h, link).await;
    }

    let feed = h.tracker.owner_feed("U1", None).await;
    let links: Vec<&str> = feed.iter().map(|e| e.link_id.as_str()).collect();
    assert_eq!(links, vec!["B", "A"]);
}

#[tokio::test]
async fn test_owner_feed_uses_fallback_per_link() {
    let h = harness(Arc::new(MemoryStore::new())).await;
    open(&h, "A").await;
    h.clock.advance(Duration::minutes(1));
    open(&h, "B").await;

    let feed = h.tracker.owner_feed("U1", None).await;
    assert_eq!(feed.len(), 2);
    assert_eq!(feed[0].link_id, "B");
}

#[tokio::test]
async fn test_owner_feed_deadline_returns_empty() {
    let flaky = Arc::new(FlakyStore::new(Arc::new(MemoryStore::with_required_indexes())));
    let h = harness(flaky.clone()).await;
    open(&h, "A").await;

    flaky.delay_queries(std::time::Duration::from_secs(5));
    let feed = h
        .tracker
        .owner_feed_within("U1", None, std::time::Duration::from_millis(50))
        .await;
    assert!(feed.is_empty());
}

#[tokio::test]
async fn test_live_window_forgets_after_six_minutes() {
    for h in [memory_harness().await, harness(Arc::new(MemoryStore::new())).await] {
        open(&h, "A").await;

        let live = h.tracker.live_visitors("U1", Some(5)).await;
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].link_id, "A");

        h.clock.advance(Duration::minutes(6));
        assert!(h.tracker.live_visitors("U1", Some(5)).await.is_empty());
    }
}

#[tokio::test]
async fn test_live_window_only_counts_opens_of_the_owner() {
    let h = memory_harness().await;
    open(&h, "A").await;
    h.tracker
        .record(AccessEventInput::new("A", EventType::DownloadFile))
        .await
        .unwrap();
    open(&h, "D").await;

    let live = h.tracker.live_visitors("U1", None).await;
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].event_type, EventType::OpenShare);
    assert_eq!(ids(&live).len(), 1);
}

#[tokio::test]
async fn test_live_fallback_matches_indexed_path_past_scan_limit() {
    let bare = harness(Arc::new(MemoryStore::new())).await;

    // Link previews flood the window, opens come after them
    for _ in 0..(DEFAULT_FALLBACK_LIMIT + 50) {
        bare.tracker
            .record(AccessEventInput::new("A", EventType::LinkPreview))
            .await
            .unwrap();
    }
    for link in ["A", "B", "A"] {
        bare.clock.advance(Duration::seconds(10));
        open(&bare, link).await;
    }

    // Same documents, same ids, behind every index
    let indexed = Arc::new(MemoryStore::with_required_indexes());
    for row in bare
        .store
        .query(&Query::collection(ACCESS_EVENTS))
        .await
        .unwrap()
    {
        indexed.put(ACCESS_EVENTS, &row.id, row.data).await.unwrap();
    }

    let with_index = LiveVisitors::new(indexed, bare.clock.clone())
        .live_visitors("U1", 5)
        .await;
    let without_index = bare.tracker.live_visitors("U1", Some(5)).await;

    assert_eq!(with_index.len(), 3);
    assert_eq!(ids(&with_index), ids(&without_index));
    let links: Vec<&str> = without_index.iter().map(|e| e.link_id.as_str()).collect();
    assert_eq!(links, vec!["A", "B", "A"]);
    assert_newest_first(&without_index);
}

#[tokio::test]
async fn test_owner_summary_counts_visible_events() {
    let h = memory_harness().await;
    open(&h, "A").await;
    open(&h, "B").await;
    h.tracker
        .record(AccessEventInput::new("A", EventType::DownloadFile).with_client_ip("5.6.7.8"))
        .await
        .unwrap();
    open(&h, "C").await;

    let summary = h.tracker.owner_summary("U1", None).await;
    assert_eq!(summary.events, 3);
    assert_eq!(summary.views, 2);
    assert_eq!(summary.downloads, 1);
    assert_eq!(summary.links, 2);
    assert_eq!(summary.unique_visitors, 2);
}
