//! Application state shared across handlers.

use std::sync::Arc;

use airq_core::{Clock, SensorDevice, SystemClock};
use airq_store::SampleStore;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::ingest::{IngestionLoop, IngestionStatus};
use crate::query::QueryService;

/// Shared application state.
pub struct AppState {
    /// The data store, shared with the ingestion loop.
    pub store: Arc<SampleStore>,
    /// Configuration the service was started with.
    pub config: Config,
    /// Read-side access to the store.
    pub query: QueryService,
    /// State and counters of the ingestion loop.
    pub ingestion: Arc<IngestionStatus>,
    /// Source of "now" for ingestion and queries.
    pub clock: Arc<dyn Clock>,
    /// Cancelled on shutdown.
    pub shutdown: CancellationToken,
    /// When the service started.
    pub started_at: OffsetDateTime,
}

impl AppState {
    /// Create new application state using the system clock.
    pub fn new(store: Arc<SampleStore>, config: Config) -> Arc<Self> {
        Self::with_clock(store, config, Arc::new(SystemClock), CancellationToken::new())
    }

    /// Create new application state with an explicit clock and shutdown token.
    pub fn with_clock(
        store: Arc<SampleStore>,
        config: Config,
        clock: Arc<dyn Clock>,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        let query = QueryService::new(Arc::clone(&store), config.query.default_window())
            .with_clock(Arc::clone(&clock))
            .with_cancellation(shutdown.clone());

        Arc::new(Self {
            store,
            config,
            query,
            ingestion: Arc::new(IngestionStatus::new()),
            started_at: clock.now_utc(),
            clock,
            shutdown,
        })
    }

    /// An ingestion loop for `device` wired to this state's store, clock,
    /// status and shutdown token.
    pub fn ingestion_loop<D: SensorDevice>(&self, device: D) -> IngestionLoop<D> {
        IngestionLoop::new(
            device,
            Arc::clone(&self.store),
            self.config.sensor.ingest_options(),
        )
        .with_clock(Arc::clone(&self.clock))
        .with_status(Arc::clone(&self.ingestion))
        .with_cancellation(self.shutdown.clone())
    }
}
