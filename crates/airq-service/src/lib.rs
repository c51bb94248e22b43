//! Ingestion loop and HTTP query API for particulate sensors.
//!
//! This crate provides a service that:
//! - Polls an SDS011-class sensor on a fixed interval
//! - Decodes each frame and stores the reading in the local database
//! - Exposes a JSON API for querying stored readings
//!
//! # REST API Endpoints
//!
//! - `GET /api/health` - Service health check
//! - `GET /api/status` - Ingestion state, counters and store summary
//! - `GET /api/readings?start=&end=` - Readings within an RFC 3339 time range
//! - `GET /api/keys` - Every stored key
//!
//! # Configuration
//!
//! The service reads configuration from `~/.config/airq/server.toml`:
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:8080"
//!
//! [storage]
//! path = "~/.local/share/airq/airquality.db"
//! lock_timeout_ms = 1000
//!
//! [sensor]
//! port = "/dev/ttyUSB0"
//! baud_rate = 9600
//! poll_interval = 30
//! read_timeout = 5
//!
//! [query]
//! default_window = 900
//! ```

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod api;
pub mod config;
pub mod ingest;
pub mod query;
pub mod state;

pub use config::{
    Config, ConfigError, QueryConfig, SensorConfig, ServerConfig, StorageConfig, ValidationError,
};
pub use ingest::{
    IngestError, IngestOptions, IngestionLoop, IngestionState, IngestionStats, IngestionStatus,
};
pub use query::{QueryError, QueryResult, QueryService};
pub use state::AppState;

/// The full HTTP application: API routes plus tracing and CORS layers.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(api::router())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
