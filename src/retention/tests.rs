use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use rstest::rstest;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use super::*;
use crate::{
    config::RetentionConfig,
    db::{DbError, DbResult, DocumentStore, MemoryDocumentStore, WriteBatch},
    models::{CollectionPath, Document, DocumentPath},
};

const NOW: f64 = 1_700_000_000.0;
const RETENTION: f64 = 604_800.0;
const CUTOFF: f64 = NOW - RETENTION;

/// Memory store that records page traffic and can inject failures.
#[derive(Default)]
struct RecordingStore {
    inner: MemoryDocumentStore,
    /// `query_expired` calls per collection.
    page_queries: Mutex<HashMap<String, usize>>,
    /// Size of every committed batch, in order.
    batches: Mutex<Vec<usize>>,
    commits: AtomicUsize,
    fail_listing: bool,
    /// Fail the commit with this 1-based index.
    fail_commit: Option<usize>,
    /// Simulated latency of each commit.
    commit_delay: Option<Duration>,
    /// Cancelled once the first commit lands.
    cancel_after_first_commit: Option<CancellationToken>,
}

impl RecordingStore {
    fn queries_for(&self, events: &CollectionPath) -> usize {
        self.page_queries
            .lock()
            .get(events.as_str())
            .copied()
            .unwrap_or(0)
    }

    fn batches(&self) -> Vec<usize> {
        self.batches.lock().clone()
    }
}

#[async_trait]
impl DocumentStore for RecordingStore {
    async fn list_collections(&self) -> DbResult<Vec<CollectionPath>> {
        if self.fail_listing {
            return Err(DbError::Internal("listing unavailable".into()));
        }
        self.inner.list_collections().await
    }

    async fn list_documents(&self, collection: &CollectionPath) -> DbResult<Vec<DocumentPath>> {
        self.inner.list_documents(collection).await
    }

    async fn set(&self, path: &DocumentPath, data: Value) -> DbResult<()> {
        self.inner.set(path, data).await
    }

    async fn get(&self, path: &DocumentPath) -> DbResult<Option<Document>> {
        self.inner.get(path).await
    }

    async fn query_expired(
        &self,
        collection: &CollectionPath,
        cutoff: f64,
        limit: usize,
    ) -> DbResult<Vec<DocumentPath>> {
        *self
            .page_queries
            .lock()
            .entry(collection.to_string())
            .or_default() += 1;
        self.inner.query_expired(collection, cutoff, limit).await
    }

    async fn count_expired(&self, collection: &CollectionPath, cutoff: f64) -> DbResult<u64> {
        self.inner.count_expired(collection, cutoff).await
    }

    async fn commit(&self, batch: WriteBatch) -> DbResult<usize> {
        let n = self.commits.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_commit == Some(n) {
            return Err(DbError::Internal("commit rejected".into()));
        }
        if let Some(delay) = self.commit_delay {
            tokio::time::sleep(delay).await;
        }
        self.batches.lock().push(batch.len());
        let applied = self.inner.commit(batch).await?;
        if let Some(cancel) = &self.cancel_after_first_commit {
            cancel.cancel();
        }
        Ok(applied)
    }

    async fn health_check(&self) -> DbResult<()> {
        self.inner.health_check().await
    }
}

fn events_of(registry: &str, device: &str) -> CollectionPath {
    CollectionPath::parse(&format!("{registry}/{device}/iot-events/telemetry/events")).unwrap()
}

async fn seed(store: &dyn DocumentStore, events: &CollectionPath, timestamps: &[f64]) {
    for ts in timestamps {
        let doc = events.doc(&ts.to_string()).unwrap();
        store
            .set(&doc, json!({ "timestamp": ts, "boiler_temp": 92 }))
            .await
            .unwrap();
    }
}

/// `count` distinct timestamps at or before the cutoff.
fn expired_timestamps(count: usize) -> Vec<f64> {
    (0..count).map(|i| CUTOFF - i as f64).collect()
}

fn sweeper(store: Arc<dyn DocumentStore>, config: RetentionConfig) -> Sweeper {
    Sweeper::new(store, config)
}

fn config_with_page_size(page_size: usize) -> RetentionConfig {
    RetentionConfig {
        page_size,
        ..Default::default()
    }
}

#[rstest]
#[case(0, 500)]
#[case(1, 500)]
#[case(499, 500)]
#[case(500, 500)]
#[case(501, 500)]
#[case(1000, 500)]
#[case(1200, 500)]
#[case(250, 100)]
#[case(7, 1)]
#[tokio::test]
async fn test_page_operations_per_device(#[case] expired: usize, #[case] page_size: usize) {
    let store = Arc::new(RecordingStore::default());
    let events = events_of("reg", "dev");
    seed(store.as_ref(), &events, &expired_timestamps(expired)).await;
    // Keep the device discoverable when nothing is expired.
    seed(store.as_ref(), &events, &[NOW]).await;

    let report = sweeper(store.clone(), config_with_page_size(page_size))
        .run_with_cutoff(CUTOFF)
        .await
        .unwrap();

    let expected_pages = expired.div_ceil(page_size) + 1;
    assert_eq!(store.queries_for(&events), expected_pages);
    assert_eq!(report.pages, expected_pages as u64);
    assert_eq!(report.documents_deleted, expired as u64);
}

#[tokio::test]
async fn test_pages_of_1200_expired() {
    let store = Arc::new(RecordingStore::default());
    let events = events_of("RebelEspresso", "re-2.0-9999998");
    seed(store.as_ref(), &events, &expired_timestamps(1200)).await;

    let report = sweeper(store.clone(), RetentionConfig::default())
        .run_with_cutoff(CUTOFF)
        .await
        .unwrap();

    assert_eq!(store.batches(), vec![500, 500, 200]);
    assert_eq!(store.queries_for(&events), 4);
    assert_eq!(report.documents_deleted, 1200);
    assert_eq!(report.devices.len(), 1);
    assert_eq!(report.devices[0].pages, 4);
    assert!(report.is_complete());
}

#[tokio::test]
async fn test_only_documents_past_the_cutoff_are_deleted() {
    let store = Arc::new(MemoryDocumentStore::new());
    let events = events_of("reg", "dev");
    let t = NOW;
    seed(
        store.as_ref(),
        &events,
        &[t - 800_000.0, t - 700_000.0, t - 100.0, t + 100.0],
    )
    .await;

    let report = sweeper(store.clone(), RetentionConfig::default())
        .run_with_cutoff(CUTOFF)
        .await
        .unwrap();

    assert_eq!(report.documents_deleted, 2);
    let remaining: Vec<String> = store
        .list_documents(&events)
        .await
        .unwrap()
        .iter()
        .map(|p| p.id().to_string())
        .collect();
    assert_eq!(
        remaining,
        vec![(t - 100.0).to_string(), (t + 100.0).to_string()]
    );
}

#[tokio::test]
async fn test_sweep_is_complete_and_safe_across_devices() {
    let store = Arc::new(RecordingStore::default());
    let mut fresh = 0;
    let mut all_events = Vec::new();
    for (r, registry) in ["reg-a", "reg-b"].iter().enumerate() {
        for d in 0..3 {
            let events = events_of(registry, &format!("dev-{d}"));
            let expired = 100 * (r + 1) + 37 * d;
            seed(store.as_ref(), &events, &expired_timestamps(expired)).await;
            let newer: Vec<f64> = (1..=d + 1).map(|i| CUTOFF + i as f64 * 0.5).collect();
            fresh += newer.len();
            seed(store.as_ref(), &events, &newer).await;
            all_events.push(events);
        }
    }

    let report = sweeper(store.clone(), config_with_page_size(64))
        .run_with_cutoff(CUTOFF)
        .await
        .unwrap();
    assert_eq!(report.devices_swept, 6);

    for events in &all_events {
        assert_eq!(store.count_expired(events, CUTOFF).await.unwrap(), 0);
    }
    assert_eq!(store.inner.len(), fresh);
    assert!(store.batches().iter().all(|size| *size <= 64));
}

#[tokio::test]
async fn test_second_sweep_deletes_nothing() {
    let store = Arc::new(RecordingStore::default());
    let events = events_of("reg", "dev");
    seed(store.as_ref(), &events, &expired_timestamps(750)).await;
    let sweeper = sweeper(store.clone(), RetentionConfig::default());

    let first = sweeper.run_with_cutoff(CUTOFF).await.unwrap();
    assert_eq!(first.documents_deleted, 750);

    let second = sweeper.run_with_cutoff(CUTOFF).await.unwrap();
    assert_eq!(second.documents_deleted, 0);
    assert_eq!(second.pages, 1);
    assert_eq!(store.batches(), vec![500, 250]);
}

#[tokio::test]
async fn test_empty_store() {
    let store = Arc::new(RecordingStore::default());

    let report = sweeper(store.clone(), RetentionConfig::default())
        .run_with_cutoff(CUTOFF)
        .await
        .unwrap();

    assert_eq!(report.devices_swept, 0);
    assert_eq!(report.documents_deleted, 0);
    assert!(store.batches().is_empty());
    assert_eq!(report.status(), "success");
}

#[tokio::test]
async fn test_unprunable_documents_survive() {
    let store = Arc::new(MemoryDocumentStore::new());
    let events = events_of("reg", "dev");
    for (id, body) in [
        ("missing", json!({ "boiler_temp": 92 })),
        ("text", json!({ "timestamp": "1970-01-01T00:00:00Z" })),
        ("old", json!({ "timestamp": 1 })),
    ] {
        store.set(&events.doc(id).unwrap(), body).await.unwrap();
    }

    let report = sweeper(store.clone(), RetentionConfig::default())
        .run_with_cutoff(CUTOFF)
        .await
        .unwrap();

    assert_eq!(report.documents_deleted, 1);
    assert!(store.get(&events.doc("old").unwrap()).await.unwrap().is_none());
    assert!(store.get(&events.doc("missing").unwrap()).await.unwrap().is_some());
    assert!(store.get(&events.doc("text").unwrap()).await.unwrap().is_some());
}

#[tokio::test]
async fn test_device_shells_are_kept() {
    let store = Arc::new(MemoryDocumentStore::new());
    let events = events_of("reg", "dev");
    seed(store.as_ref(), &events, &expired_timestamps(3)).await;

    sweeper(store.clone(), RetentionConfig::default())
        .run_with_cutoff(CUTOFF)
        .await
        .unwrap();

    assert!(store.is_empty());
    let root = CollectionPath::root("reg").unwrap();
    let devices = store.list_documents(&root).await.unwrap();
    assert_eq!(devices, vec![root.doc("dev").unwrap()]);

    // The shell is still swept, and finds nothing.
    let report = sweeper(store.clone(), RetentionConfig::default())
        .run_with_cutoff(CUTOFF)
        .await
        .unwrap();
    assert_eq!(report.devices_swept, 1);
    assert_eq!(report.pages, 1);
}

#[tokio::test]
async fn test_commit_failure_aborts_sweep() {
    let store = Arc::new(RecordingStore {
        fail_commit: Some(2),
        ..Default::default()
    });
    let events = events_of("reg", "dev");
    seed(store.as_ref(), &events, &expired_timestamps(1200)).await;

    let err = sweeper(store.clone(), RetentionConfig::default())
        .run_with_cutoff(CUTOFF)
        .await
        .unwrap_err();

    match err {
        SweepError::Device { device, source } => {
            assert_eq!(device.as_str(), "reg/dev");
            assert!(matches!(source, DbError::Internal(_)));
        }
        other => panic!("unexpected error: {other}"),
    }
    // The first page stays deleted; the failed page left everything else.
    assert_eq!(store.inner.len(), 700);
}

#[tokio::test]
async fn test_listing_failure_aborts_sweep() {
    let store = Arc::new(RecordingStore {
        fail_listing: true,
        ..Default::default()
    });

    let err = sweeper(store, RetentionConfig::default())
        .run_with_cutoff(CUTOFF)
        .await
        .unwrap_err();
    assert!(matches!(err, SweepError::Discovery(_)));
}

#[tokio::test(start_paused = true)]
async fn test_device_failure_lets_in_flight_pages_finish() {
    let store = Arc::new(RecordingStore {
        fail_commit: Some(2),
        commit_delay: Some(Duration::from_secs(10)),
        ..Default::default()
    });
    seed(store.as_ref(), &events_of("reg", "dev-0"), &expired_timestamps(1000)).await;
    seed(store.as_ref(), &events_of("reg", "dev-1"), &expired_timestamps(1000)).await;
    let config = RetentionConfig {
        device_concurrency: 2,
        ..Default::default()
    };

    let err = sweeper(store.clone(), config)
        .run_with_cutoff(CUTOFF)
        .await
        .unwrap_err();

    assert!(matches!(err, SweepError::Device { .. }), "{err}");
    // The other device's commit was mid-flight when the failure surfaced.
    assert_eq!(store.batches(), vec![500]);
    assert_eq!(store.inner.len(), 1500);
    assert_eq!(store.commits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_cutoff_override_never_reaches_inside_retention_window() {
    let store = Arc::new(MemoryDocumentStore::new());
    let events = events_of("reg", "dev");
    let now = crate::models::epoch_seconds(chrono::Utc::now()).floor();
    seed(store.as_ref(), &events, &[CUTOFF, now]).await;
    let sweeper = sweeper(store.clone(), RetentionConfig::default());

    let report = sweeper.run_with_cutoff(1e15).await.unwrap();

    assert_eq!(report.documents_deleted, 1);
    assert!(report.cutoff < now - RETENTION + 60.0);
    let fresh = events.doc(&now.to_string()).unwrap();
    assert!(store.get(&fresh).await.unwrap().is_some());

    let report = sweeper.run_with_cutoff(f64::NAN).await.unwrap();
    assert!(report.cutoff.is_finite());
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_unbounded_max_duration_runs_to_completion() {
    let store = Arc::new(MemoryDocumentStore::new());
    seed(store.as_ref(), &events_of("reg", "dev"), &expired_timestamps(3)).await;
    let config = RetentionConfig {
        max_duration_secs: u64::MAX,
        ..Default::default()
    };

    let report = sweeper(store.clone(), config)
        .run_with_cutoff(CUTOFF)
        .await
        .unwrap();

    assert!(report.is_complete());
    assert_eq!(report.documents_deleted, 3);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_stops_between_pages_and_next_run_resumes() {
    let store = Arc::new(RecordingStore {
        commit_delay: Some(Duration::from_secs(200)),
        ..Default::default()
    });
    let events = events_of("reg", "dev");
    seed(store.as_ref(), &events, &expired_timestamps(1200)).await;
    let sweeper = sweeper(store.clone(), RetentionConfig::default());

    // Pages commit at t=200 and t=400; the check before the third page
    // sees the 300 second limit passed.
    let report = sweeper.run_with_cutoff(CUTOFF).await.unwrap();
    assert!(report.timed_out);
    assert_eq!(report.status(), "timed_out");
    assert_eq!(report.documents_deleted, 1000);
    assert!(report.devices[0].stopped_early);
    assert_eq!(store.batches(), vec![500, 500]);

    let resumed = sweeper.run_with_cutoff(CUTOFF).await.unwrap();
    assert!(resumed.is_complete());
    assert_eq!(resumed.documents_deleted, 200);
    assert_eq!(store.count_expired(&events, CUTOFF).await.unwrap(), 0);
}

#[tokio::test]
async fn test_cancellation_stops_at_page_boundary() {
    let cancel = CancellationToken::new();
    let store = Arc::new(RecordingStore {
        cancel_after_first_commit: Some(cancel.clone()),
        ..Default::default()
    });
    let events = events_of("reg", "dev");
    seed(store.as_ref(), &events, &expired_timestamps(1200)).await;

    let report = sweeper(store.clone(), RetentionConfig::default())
        .with_cancellation(cancel)
        .run_with_cutoff(CUTOFF)
        .await
        .unwrap();

    assert!(report.cancelled);
    assert_eq!(report.documents_deleted, 500);
    assert_eq!(store.inner.len(), 700);
}

#[tokio::test]
async fn test_dry_run_deletes_nothing() {
    let store = Arc::new(RecordingStore::default());
    let events = events_of("reg", "dev");
    seed(store.as_ref(), &events, &expired_timestamps(620)).await;
    seed(store.as_ref(), &events, &[NOW]).await;

    let report = sweeper(store.clone(), RetentionConfig::default())
        .run_with(SweepOptions {
            cutoff: Some(CUTOFF),
            dry_run: Some(true),
        })
        .await
        .unwrap();

    assert!(report.dry_run);
    assert_eq!(report.documents_deleted, 620);
    assert_eq!(report.pages, 0);
    assert!(store.batches().is_empty());
    assert_eq!(store.inner.len(), 621);
}

#[tokio::test]
async fn test_concurrent_devices() {
    let store = Arc::new(RecordingStore::default());
    let mut all_events = Vec::new();
    for d in 0..6 {
        let events = events_of("reg", &format!("dev-{d}"));
        seed(store.as_ref(), &events, &expired_timestamps(120 + d)).await;
        all_events.push(events);
    }
    let config = RetentionConfig {
        page_size: 50,
        device_concurrency: 4,
        ..Default::default()
    };

    let report = sweeper(store.clone(), config)
        .run_with_cutoff(CUTOFF)
        .await
        .unwrap();

    assert_eq!(report.devices_swept, 6);
    assert!(store.inner.is_empty());
    for (d, events) in all_events.iter().enumerate() {
        assert_eq!(store.queries_for(events), (120 + d).div_ceil(50) + 1);
    }
    // Sorted by device path regardless of completion order.
    let devices: Vec<&str> = report.devices.iter().map(|d| d.device.id()).collect();
    assert_eq!(
        devices,
        vec!["dev-0", "dev-1", "dev-2", "dev-3", "dev-4", "dev-5"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_worker_sweeps_on_interval_until_cancelled() {
    let store = Arc::new(MemoryDocumentStore::new());
    let events = events_of("reg", "dev");
    seed(store.as_ref(), &events, &[1.0]).await;

    let cancel = CancellationToken::new();
    let config = RetentionConfig {
        interval_hours: 1,
        ..Default::default()
    };
    let sweeper = Arc::new(
        Sweeper::new(store.clone(), config).with_cancellation(cancel.clone()),
    );
    let handle = tokio::spawn(start_retention_worker(sweeper, cancel.clone()));

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(store.len(), 1, "swept before the first interval elapsed");

    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert!(store.is_empty());

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_worker_runs_on_startup() {
    let store = Arc::new(MemoryDocumentStore::new());
    seed(store.as_ref(), &events_of("reg", "dev"), &[1.0]).await;

    let cancel = CancellationToken::new();
    let config = RetentionConfig {
        run_on_startup: true,
        ..Default::default()
    };
    let sweeper = Arc::new(Sweeper::new(store.clone(), config));
    let handle = tokio::spawn(start_retention_worker(sweeper, cancel.clone()));

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(store.is_empty());

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_disabled_worker_returns_immediately() {
    let config = RetentionConfig {
        enabled: false,
        ..Default::default()
    };
    let sweeper = Arc::new(Sweeper::new(Arc::new(MemoryDocumentStore::new()), config));
    // Would never return if the worker started its loop.
    start_retention_worker(sweeper, CancellationToken::new()).await;
}
