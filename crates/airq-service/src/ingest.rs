//! Sensor ingestion loop.
//!
//! The loop owns the device, wakes on a fixed interval, reads one buffer,
//! decodes it and appends the sample to the store. Transient failures are
//! logged and the loop waits for the next tick; a zero-length read ends it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::{RwLock, watch};
use tokio::time::{MissedTickBehavior, interval, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use airq_core::{Clock, SensorDevice, SystemClock};
use airq_store::SampleStore;
use airq_types::{DecodeError, Reading, decode};

/// Where the loop currently is within a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestionState {
    /// Waiting for the next tick.
    Idle,
    /// Waiting on the device.
    Reading,
    /// Validating the frame.
    Decoding,
    /// Writing to the store.
    Persisting,
    /// Stopped after a terminal device error.
    Faulted,
}

impl std::fmt::Display for IngestionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Reading => "reading",
            Self::Decoding => "decoding",
            Self::Persisting => "persisting",
            Self::Faulted => "faulted",
        };
        f.write_str(s)
    }
}

/// Per-tick outcome counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestionStats {
    /// Ticks that ran to an outcome.
    pub ticks: u64,
    /// Readings persisted.
    pub successes: u64,
    /// Frames rejected by the decoder.
    pub decode_failures: u64,
    /// Failed, timed out or closed device reads.
    pub transport_failures: u64,
    /// Samples the store failed to persist.
    pub store_failures: u64,
    /// When the last reading was persisted.
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_success_at: Option<OffsetDateTime>,
    /// Text of the most recent failure.
    pub last_error: Option<String>,
}

/// Observable state of an ingestion loop.
#[derive(Debug)]
pub struct IngestionStatus {
    running: AtomicBool,
    state: watch::Sender<IngestionState>,
    stats: RwLock<IngestionStats>,
}

impl IngestionStatus {
    /// Create a status in the `Idle` state with zeroed counters.
    pub fn new() -> Self {
        let (state, _) = watch::channel(IngestionState::Idle);
        Self {
            running: AtomicBool::new(false),
            state,
            stats: RwLock::new(IngestionStats::default()),
        }
    }

    /// Whether a loop is currently publishing to this status.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Current state.
    pub fn state(&self) -> IngestionState {
        *self.state.borrow()
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<IngestionState> {
        self.state.subscribe()
    }

    /// Snapshot of the counters.
    pub async fn stats(&self) -> IngestionStats {
        self.stats.read().await.clone()
    }

    fn set_state(&self, state: IngestionState) {
        self.state.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }

    async fn record(&self, outcome: &Result<Reading, IngestError>) {
        let mut stats = self.stats.write().await;
        stats.ticks += 1;
        match outcome {
            Ok(reading) => {
                stats.successes += 1;
                stats.last_success_at = Some(reading.created_at);
            }
            Err(e) => {
                match e {
                    IngestError::Transport(_) => stats.transport_failures += 1,
                    IngestError::Decode(_) => stats.decode_failures += 1,
                    IngestError::Store(_) | IngestError::Join(_) => stats.store_failures += 1,
                    IngestError::Config(_) => {}
                }
                stats.last_error = Some(e.to_string());
            }
        }
    }
}

impl Default for IngestionStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Loop timing and buffer settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOptions {
    /// Time between ticks.
    pub poll_interval: Duration,
    /// Upper bound on a single device read.
    pub read_timeout: Duration,
    /// Bytes requested per read.
    pub buffer_size: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            read_timeout: Duration::from_secs(5),
            buffer_size: airq_types::FRAME_LEN,
        }
    }
}

/// Errors produced by a tick.
///
/// Only [`IngestError::Transport`] with a terminal device error and
/// [`IngestError::Config`] end the loop; everything else is counted and
/// retried on the next tick.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum IngestError {
    #[error("Sensor read failed: {0}")]
    Transport(airq_core::Error),
    #[error("Frame rejected: {0}")]
    Decode(DecodeError),
    #[error("Failed to store reading: {0}")]
    Store(airq_store::Error),
    #[error("Store task failed: {0}")]
    Join(tokio::task::JoinError),
    #[error("Invalid ingestion options: {0}")]
    Config(String),
}

impl IngestError {
    /// Whether the loop must stop after this error.
    pub fn is_terminal(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_terminal(),
            Self::Config(_) => true,
            Self::Decode(_) | Self::Store(_) | Self::Join(_) => false,
        }
    }
}

/// Periodic read, decode and persist cycle for one device.
pub struct IngestionLoop<D> {
    device: D,
    store: Arc<SampleStore>,
    clock: Arc<dyn Clock>,
    status: Arc<IngestionStatus>,
    options: IngestOptions,
    cancel: CancellationToken,
}

impl<D: SensorDevice> IngestionLoop<D> {
    /// Create a loop reading from `device` into `store`.
    pub fn new(device: D, store: Arc<SampleStore>, options: IngestOptions) -> Self {
        Self {
            device,
            store,
            clock: Arc::new(SystemClock),
            status: Arc::new(IngestionStatus::new()),
            options,
            cancel: CancellationToken::new(),
        }
    }

    /// Use `clock` to timestamp readings.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Publish state and counters to `status`.
    pub fn with_status(mut self, status: Arc<IngestionStatus>) -> Self {
        self.status = status;
        self
    }

    /// Stop when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Handle to the loop's observable state.
    pub fn status(&self) -> Arc<IngestionStatus> {
        Arc::clone(&self.status)
    }

    /// Run until cancelled or until the device fails terminally.
    ///
    /// The device is dropped when this returns.
    pub async fn run(mut self) -> Result<(), IngestError> {
        if self.options.poll_interval.is_zero() {
            return Err(IngestError::Config("poll interval must be non-zero".into()));
        }
        if self.options.buffer_size == 0 {
            return Err(IngestError::Config("buffer size must be non-zero".into()));
        }

        info!(
            "Starting ingestion from {} (interval: {:?}, timeout: {:?})",
            self.device.name(),
            self.options.poll_interval,
            self.options.read_timeout
        );

        self.status.running.store(true, Ordering::SeqCst);
        let result = self.poll_loop().await;
        self.status.running.store(false, Ordering::SeqCst);
        result
    }

    async fn poll_loop(&mut self) -> Result<(), IngestError> {
        let mut timer = interval(self.options.poll_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut buf = vec![0u8; self.options.buffer_size];
        let mut consecutive_failures = 0u32;

        loop {
            self.status.set_state(IngestionState::Idle);

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = timer.tick() => {}
            }

            buf.fill(0);
            let Some(outcome) = self.tick(&mut buf).await else {
                break;
            };
            self.status.record(&outcome).await;

            match outcome {
                Ok(reading) => {
                    consecutive_failures = 0;
                    info!(
                        id = reading.id,
                        "Stored reading pm2.5={:.1} pm10={:.1}", reading.pm25, reading.pm10
                    );
                }
                Err(e) if e.is_terminal() => {
                    self.status.set_state(IngestionState::Faulted);
                    error!("Ingestion from {} stopped: {}", self.device.name(), e);
                    return Err(e);
                }
                Err(e) => {
                    consecutive_failures += 1;
                    log_failure(self.device.name(), &e, consecutive_failures);
                }
            }
        }

        self.status.set_state(IngestionState::Idle);
        info!("Ingestion from {} stopped", self.device.name());
        Ok(())
    }

    /// One read, decode and persist pass. `None` means shutdown was requested
    /// while waiting on the device.
    async fn tick(&mut self, buf: &mut [u8]) -> Option<Result<Reading, IngestError>> {
        self.status.set_state(IngestionState::Reading);

        let read_timeout = self.options.read_timeout;
        let read = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return None,
            read = timeout(read_timeout, self.device.read(buf)) => read,
        };

        let n = match read {
            Ok(Ok(0)) => {
                let closed = airq_core::Error::closed(self.device.name());
                return Some(Err(IngestError::Transport(closed)));
            }
            Ok(Ok(n)) => n,
            Ok(Err(e)) => return Some(Err(IngestError::Transport(e))),
            Err(_) => {
                let timed_out = airq_core::Error::timeout("read", read_timeout);
                return Some(Err(IngestError::Transport(timed_out)));
            }
        };
        debug!("Read {} bytes from {}", n, self.device.name());

        self.status.set_state(IngestionState::Decoding);
        let sample = match decode(&buf[..n]) {
            Ok(sample) => sample,
            Err(e) => return Some(Err(IngestError::Decode(e))),
        };

        self.status.set_state(IngestionState::Persisting);
        let store = Arc::clone(&self.store);
        let now = self.clock.now_utc();
        let stored = tokio::task::spawn_blocking(move || store.append_sample(sample, now)).await;

        Some(match stored {
            Ok(Ok(reading)) => Ok(reading),
            Ok(Err(e)) => Err(IngestError::Store(e)),
            Err(e) => Err(IngestError::Join(e)),
        })
    }
}

/// Log a non-terminal failure, quieting down after a run of them.
fn log_failure(device: &str, err: &IngestError, consecutive: u32) {
    if consecutive <= 3 {
        warn!("Ingestion from {} failed: {} (attempt {})", device, err, consecutive);
    } else if consecutive == 4 {
        error!(
            "Ingestion from {} failed {} times in a row, will continue trying silently",
            device, consecutive
        );
    } else {
        debug!("Ingestion from {} failed: {} (attempt {})", device, err, consecutive);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use airq_core::{ManualClock, MockDevice, MockResponse};
    use airq_store::{SampleKey, StoreOptions};
    use std::io::ErrorKind;
    use time::macros::datetime;

    fn options() -> IngestOptions {
        IngestOptions {
            poll_interval: Duration::from_secs(30),
            read_timeout: Duration::from_secs(5),
            buffer_size: airq_types::FRAME_LEN,
        }
    }

    fn clock() -> Arc<dyn Clock> {
        Arc::new(ManualClock::new(datetime!(2024-05-01 12:00:00 UTC)))
    }

    fn store() -> Arc<SampleStore> {
        Arc::new(SampleStore::open_in_memory().unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn test_persists_frames_in_order_until_closed() {
        let store = store();
        let device = MockDevice::builder()
            .name("mock-sds011")
            .response(MockResponse::frame(100, 200))
            .response(MockResponse::frame(125, 250))
            .response(MockResponse::frame(99, 198))
            .response(MockResponse::Eof)
            .build();

        let ingest = IngestionLoop::new(device, Arc::clone(&store), options()).with_clock(clock());
        let status = ingest.status();

        let err = ingest.run().await.unwrap_err();
        assert!(matches!(
            err,
            IngestError::Transport(airq_core::Error::Closed { .. })
        ));
        assert!(err.to_string().contains("mock-sds011"));
        assert_eq!(status.state(), IngestionState::Faulted);
        assert!(!status.is_running());

        let readings = store.range_scan(SampleKey::MIN, SampleKey::MAX).unwrap();
        let pm25: Vec<f64> = readings.iter().map(|r| r.pm25).collect();
        assert_eq!(pm25, vec![10.0, 12.5, 9.9]);
        assert_eq!(readings[1].pm10, 25.0);

        let stats = status.stats().await;
        assert_eq!(stats.ticks, 4);
        assert_eq!(stats.successes, 3);
        assert_eq!(stats.transport_failures, 1);
        assert_eq!(
            stats.last_success_at,
            Some(datetime!(2024-05-01 12:00:00 UTC))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried() {
        let store = store();
        let mut garbage = vec![0u8; airq_types::FRAME_LEN];
        garbage[0] = 0x42;

        let device = MockDevice::builder()
            .response(MockResponse::IoError(ErrorKind::BrokenPipe))
            .response(MockResponse::Bytes(garbage))
            .response(MockResponse::Hang)
            .response(MockResponse::frame(55, 66))
            .response(MockResponse::Eof)
            .build();

        let ingest = IngestionLoop::new(device, Arc::clone(&store), options()).with_clock(clock());
        let status = ingest.status();

        let err = ingest.run().await.unwrap_err();
        assert!(err.is_terminal());

        let stats = status.stats().await;
        assert_eq!(stats.ticks, 5);
        assert_eq!(stats.successes, 1);
        assert_eq!(stats.decode_failures, 1);
        // broken pipe, read timeout, zero-length read
        assert_eq!(stats.transport_failures, 3);
        assert_eq!(stats.store_failures, 0);

        let readings = store.range_scan(SampleKey::MIN, SampleKey::MAX).unwrap();
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].pm25, 5.5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_failures_drop_reading_and_continue() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("airq.db");
        let store_options = StoreOptions::default().lock_timeout(Duration::from_millis(20));
        let store = Arc::new(SampleStore::open(&path, &store_options).unwrap());

        // Another writer holds the database for the whole run
        let other = rusqlite::Connection::open(&path).unwrap();
        other.execute_batch("BEGIN IMMEDIATE").unwrap();

        let device = MockDevice::builder()
            .name("locked")
            .response(MockResponse::frame(100, 200))
            .response(MockResponse::frame(110, 210))
            .response(MockResponse::Eof)
            .build();

        let ingest = IngestionLoop::new(device, Arc::clone(&store), options()).with_clock(clock());
        let status = ingest.status();

        let err = ingest.run().await.unwrap_err();
        assert!(matches!(
            err,
            IngestError::Transport(airq_core::Error::Closed { .. })
        ));

        let stats = status.stats().await;
        assert_eq!(stats.ticks, 3);
        assert_eq!(stats.successes, 0);
        assert_eq!(stats.store_failures, 2);
        assert_eq!(stats.transport_failures, 1);
        assert!(stats.last_success_at.is_none());

        other.execute_batch("COMMIT").unwrap();
        assert_eq!(store.count().unwrap(), 0);
        assert_eq!(store.append(1.0, 1.0, datetime!(2024-05-01 12:00:00 UTC)).unwrap().id, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_abandons_pending_read() {
        let device = MockDevice::new("silent");
        let script = device.script();
        let cancel = CancellationToken::new();

        let ingest = IngestionLoop::new(device, store(), options())
            .with_clock(clock())
            .with_cancellation(cancel.clone());
        let status = ingest.status();
        let mut states = status.subscribe();

        let handle = tokio::spawn(ingest.run());

        states
            .wait_for(|s| *s == IngestionState::Reading)
            .await
            .unwrap();
        assert_eq!(script.read_count(), 1);
        assert!(status.is_running());

        cancel.cancel();
        handle.await.unwrap().unwrap();

        assert_eq!(status.state(), IngestionState::Idle);
        assert_eq!(status.stats().await.ticks, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reads_once_per_interval() {
        let device = MockDevice::new("ticker");
        let script = device.script();
        for _ in 0..10 {
            script.push(MockResponse::frame(10, 10));
        }
        let cancel = CancellationToken::new();

        let ingest = IngestionLoop::new(device, store(), options())
            .with_clock(clock())
            .with_cancellation(cancel.clone());
        let handle = tokio::spawn(ingest.run());

        // First tick fires immediately, then one every 30 s
        tokio::time::sleep(Duration::from_secs(65)).await;
        assert_eq!(script.read_count(), 3);

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_rejects_zero_interval() {
        let options = IngestOptions {
            poll_interval: Duration::ZERO,
            ..options()
        };
        let ingest = IngestionLoop::new(MockDevice::new("m"), store(), options);
        let err = ingest.run().await.unwrap_err();
        assert!(matches!(err, IngestError::Config(_)));
    }

    #[test]
    fn test_error_classification() {
        let io = std::io::Error::new(ErrorKind::Other, "x");
        assert!(!IngestError::Transport(io.into()).is_terminal());
        assert!(IngestError::Transport(airq_core::Error::closed("d")).is_terminal());
        assert!(!IngestError::Decode(DecodeError::InsufficientBytes { expected: 9, actual: 2 }).is_terminal());
    }

    #[test]
    fn test_state_serializes_lowercase() {
        let json = serde_json::to_string(&IngestionState::Persisting).unwrap();
        assert_eq!(json, "\"persisting\"");
        assert_eq!(IngestionState::Faulted.to_string(), "faulted");
    }
}
