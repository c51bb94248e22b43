//! End-to-end tests: scripted device through the ingestion loop into an
//! on-disk store, read back through the query service and the HTTP API.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use time::format_description::well_known::Rfc3339;
use time::macros::datetime;
use time::{Duration, OffsetDateTime};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use airq_core::{Clock, ManualClock, MockDevice, MockResponse};
use airq_service::{AppState, Config, IngestError, IngestionState, QueryError};
use airq_store::{SampleKey, SampleStore, StoreOptions};

const T0: OffsetDateTime = datetime!(2024-05-01 12:00:00 UTC);

struct Harness {
    state: Arc<AppState>,
    clock: Arc<ManualClock>,
    _dir: tempfile::TempDir,
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.storage.path = dir.path().join("airquality.db");

    let store = SampleStore::open(&config.storage.path, &config.storage.store_options()).unwrap();
    let clock = Arc::new(ManualClock::new(T0));
    let state = AppState::with_clock(
        Arc::new(store),
        config,
        clock.clone(),
        CancellationToken::new(),
    );

    Harness {
        state,
        clock,
        _dir: dir,
    }
}

/// Wall clock that starts at `origin` and follows tokio's clock, so paused
/// tests see time move between ticks.
struct TokioClock {
    origin: OffsetDateTime,
    started: tokio::time::Instant,
}

impl TokioClock {
    fn new(origin: OffsetDateTime) -> Self {
        Self {
            origin,
            started: tokio::time::Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now_utc(&self) -> OffsetDateTime {
        self.origin + self.started.elapsed()
    }
}

fn rfc3339(t: OffsetDateTime) -> String {
    t.format(&Rfc3339).unwrap()
}

fn scripted_device() -> MockDevice {
    MockDevice::builder()
        .name("scripted")
        .response(MockResponse::frame(100, 150))
        .response(MockResponse::frame(125, 180))
        .response(MockResponse::frame(99, 120))
        .response(MockResponse::Eof)
        .build()
}

#[tokio::test(start_paused = true)]
async fn test_ingested_readings_come_back_in_order() {
    let h = harness();

    let err = h.state.ingestion_loop(scripted_device()).run().await.unwrap_err();
    assert!(matches!(err, IngestError::Transport(_)));
    assert_eq!(h.state.ingestion.state(), IngestionState::Faulted);

    let readings = h.state.query.range(None, None).await.unwrap();
    let values: Vec<(u64, f64, f64)> = readings.iter().map(|r| (r.id, r.pm25, r.pm10)).collect();
    assert_eq!(
        values,
        vec![(1, 10.0, 15.0), (2, 12.5, 18.0), (3, 9.9, 12.0)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_readings_one_second_apart_query_by_exact_bounds() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.storage.path = dir.path().join("airquality.db");
    config.sensor.poll_interval = 1;

    let store = SampleStore::open(&config.storage.path, &config.storage.store_options()).unwrap();
    let state = AppState::with_clock(
        Arc::new(store),
        config,
        Arc::new(TokioClock::new(T0)),
        CancellationToken::new(),
    );

    let err = state.ingestion_loop(scripted_device()).run().await.unwrap_err();
    assert!(matches!(err, IngestError::Transport(_)));

    let stored = state.store.range_scan(SampleKey::MIN, SampleKey::MAX).unwrap();
    let times: Vec<OffsetDateTime> = stored.iter().map(|r| r.created_at).collect();
    assert_eq!(
        times,
        vec![T0, T0 + Duration::seconds(1), T0 + Duration::seconds(2)]
    );

    let (first, second, last) = (rfc3339(times[0]), rfc3339(times[1]), rfc3339(times[2]));

    let readings = state.query.range(Some(&first), Some(&last)).await.unwrap();
    let values: Vec<(u64, f64, f64)> = readings.iter().map(|r| (r.id, r.pm25, r.pm10)).collect();
    assert_eq!(
        values,
        vec![(1, 10.0, 15.0), (2, 12.5, 18.0), (3, 9.9, 12.0)]
    );

    let readings = state.query.range(Some(&second), Some(&last)).await.unwrap();
    let ids: Vec<u64> = readings.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![2, 3]);

    let readings = state.query.range(Some(&first), Some(&second)).await.unwrap();
    let ids: Vec<u64> = readings.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![1, 2]);
}

#[tokio::test(start_paused = true)]
async fn test_default_window_over_stale_data_is_empty() {
    let h = harness();
    let _ = h.state.ingestion_loop(scripted_device()).run().await;

    h.clock.advance(Duration::hours(1));

    let readings = h.state.query.range(None, None).await.unwrap();
    assert!(readings.is_empty());

    // Still reachable with explicit bounds
    let readings = h
        .state
        .query
        .range(Some("2024-05-01T11:00:00Z"), None)
        .await
        .unwrap();
    assert_eq!(readings.len(), 3);
}

#[tokio::test]
async fn test_range_bounds_are_inclusive() {
    let h = harness();
    let t1 = T0;
    let t2 = T0 + Duration::seconds(30);
    let t3 = T0 + Duration::seconds(60);
    h.state.store.append(1.0, 1.0, t1).unwrap();
    h.state.store.append(2.0, 2.0, t2).unwrap();
    h.state.store.append(3.0, 3.0, t3).unwrap();

    let readings = h.state.query.range_between(Some(t1), Some(t2)).await.unwrap();
    let ids: Vec<u64> = readings.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![1, 2]);

    let readings = h
        .state
        .query
        .range_between(Some(t3 + Duration::seconds(1)), Some(t3 + Duration::seconds(2)))
        .await
        .unwrap();
    assert!(readings.is_empty());

    let err = h
        .state
        .query
        .range_between(Some(t3), Some(t1))
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::InvalidTimeRange(_)));
}

#[tokio::test(start_paused = true)]
async fn test_sequence_survives_restart() {
    let h = harness();
    let _ = h.state.ingestion_loop(scripted_device()).run().await;
    let path = h.state.config.storage.path.clone();
    drop(h.state);

    let store = SampleStore::open(&path, &StoreOptions::default()).unwrap();
    assert_eq!(store.all_keys().unwrap().len(), 3);
    assert_eq!(store.append(1.0, 1.0, T0).unwrap().id, 4);
}

#[tokio::test(start_paused = true)]
async fn test_http_readings_and_keys() {
    let h = harness();
    let _ = h.state.ingestion_loop(scripted_device()).run().await;

    let app = airq_service::app(Arc::clone(&h.state));
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/readings")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    let pm25: Vec<f64> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["pm25"].as_f64().unwrap())
        .collect();
    assert_eq!(pm25, vec![10.0, 12.5, 9.9]);

    let response = app
        .oneshot(Request::builder().uri("/api/keys").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let keys: Vec<String> = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(keys.len(), 3);
    assert!(keys.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_ingestion_cleanly() {
    let h = harness();
    let device = MockDevice::new("quiet");
    let script = device.script();
    script.push(MockResponse::frame(10, 10));

    let ingest = h.state.ingestion_loop(device);
    let handle = tokio::spawn(ingest.run());

    // Second tick blocks on the empty script until shutdown
    tokio::time::sleep(std::time::Duration::from_secs(45)).await;
    assert_eq!(script.read_count(), 2);

    h.state.shutdown.cancel();
    handle.await.unwrap().unwrap();

    assert!(!h.state.ingestion.is_running());
    assert_eq!(h.state.store.count().unwrap(), 1);
}
