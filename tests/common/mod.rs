//! Fixtures shared by the integration tests

#![allow(dead_code)]

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};
use sharetrail::analytics::HmacVisitorIdentity;
use sharetrail::clock::ManualClock;
use sharetrail::storage::share_directory::{FOLDERS, SHARE_LINKS};
use sharetrail::storage::{
    Document, DocumentStore, FieldOp, MemoryStore, Query, StoreError, StoreResult,
    StoredDocument, StoreShareDirectory,
};
use sharetrail::AccessTracker;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::sync::Arc;
use std::time::Duration;

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap()
}

pub fn doc(value: Value) -> Document {
    value.as_object().cloned().unwrap()
}

/// Wraps a store and injects failures on demand
pub struct FlakyStore {
    pub inner: Arc<dyn DocumentStore>,
    failing_links: Mutex<Vec<String>>,
    fail_creates: AtomicBool,
    fail_updates: AtomicBool,
    query_delay: Mutex<Option<Duration>>,
}

impl FlakyStore {
    pub fn new(inner: Arc<dyn DocumentStore>) -> Self {
        Self {
            inner,
            failing_links: Mutex::new(Vec::new()),
            fail_creates: AtomicBool::new(false),
            fail_updates: AtomicBool::new(false),
            query_delay: Mutex::new(None),
        }
    }

    /// Event queries filtered on this link fail
    pub fn fail_link(&self, link_id: &str) {
        self.failing_links.lock().unwrap().push(link_id.to_string());
    }

    pub fn fail_creates(&self, fail: bool) {
        self.fail_creates.store(fail, Ordering::SeqCst);
    }

    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    pub fn delay_queries(&self, delay: Duration) {
        *self.query_delay.lock().unwrap() = Some(delay);
    }
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn init(&self) -> anyhow::Result<()> {
        self.inner.init().await
    }

    async fn create(&self, collection: &str, data: Document) -> StoreResult<String> {
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(StoreError::Other(anyhow!("write quota exceeded")));
        }
        self.inner.create(collection, data).await
    }

    async fn put(&self, collection: &str, id: &str, data: Document) -> StoreResult<()> {
        self.inner.put(collection, id, data).await
    }

    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        self.inner.get(collection, id).await
    }

    async fn update(&self, collection: &str, id: &str, ops: &[FieldOp]) -> StoreResult<()> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(StoreError::Other(anyhow!("contention")));
        }
        self.inner.update(collection, id, ops).await
    }

    async fn query(&self, query: &Query) -> StoreResult<Vec<StoredDocument>> {
        let delay = *self.query_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failing = self.failing_links.lock().unwrap().clone();
        let hits_failing_link = query.filters.iter().any(|f| {
            f.field == "linkId" && failing.iter().any(|link| f.value == json!(link))
        });
        if hits_failing_link {
            return Err(StoreError::Other(anyhow!("deadline exceeded")));
        }
        self.inner.query(query).await
    }
}

/// Owner `U1` with links A and B on folder F1 (B revoked) and link C on the
/// deleted folder F2. Owner `U2` has link D on F1.
pub async fn seed_directory(store: &dyn DocumentStore) {
    store.put(FOLDERS, "F1", doc(json!({"deleted": false}))).await.unwrap();
    store.put(FOLDERS, "F2", doc(json!({"deleted": true}))).await.unwrap();
    for (id, value) in [
        ("A", json!({"createdBy": "U1", "folderId": "F1"})),
        ("B", json!({"createdBy": "U1", "folderId": "F1", "revoked": true})),
        ("C", json!({"createdBy": "U1", "folderId": "F2"})),
        ("D", json!({"createdBy": "U2", "folderId": "F1"})),
    ] {
        store.put(SHARE_LINKS, id, doc(value)).await.unwrap();
    }
}

pub struct Harness {
    pub store: Arc<dyn DocumentStore>,
    pub clock: Arc<ManualClock>,
    pub tracker: Arc<AccessTracker>,
}

/// A tracker over `store`, with the share directory read from the same store
pub async fn harness(store: Arc<dyn DocumentStore>) -> Harness {
    store.init().await.unwrap();
    seed_directory(store.as_ref()).await;

    let clock = Arc::new(ManualClock::new(start_time()));
    let tracker = Arc::new(AccessTracker::new(
        Arc::clone(&store),
        Arc::new(StoreShareDirectory::new(Arc::clone(&store))),
        Arc::new(HmacVisitorIdentity::new(Some("integration-secret"), None).unwrap()),
        clock.clone(),
    ));

    Harness {
        store,
        clock,
        tracker,
    }
}

pub async fn memory_harness() -> Harness {
    harness(Arc::new(MemoryStore::with_required_indexes())).await
}
