//! REST API endpoints for the airq service.
//!
//! All endpoints speak JSON. Errors are returned as `{"error": "..."}` with a
//! status code chosen by [`AppError`]: malformed time bounds are `400`, store
//! failures `500` and queries cut short by shutdown `503`.
//!
//! # Example
//!
//! ```ignore
//! use airq_service::api;
//!
//! let app = api::router().with_state(state);
//! ```

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use airq_types::Reading;

use crate::ingest::{IngestionState, IngestionStats};
use crate::query::QueryError;
use crate::state::AppState;

/// Create the API router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/status", get(get_status))
        .route("/api/readings", get(get_readings))
        .route("/api/keys", get(get_keys))
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Health check endpoint.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: OffsetDateTime::now_utc(),
    })
}

/// Service status response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub version: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    pub ingestion: IngestionStatusResponse,
    pub store: StoreStatusResponse,
}

/// Ingestion loop part of [`StatusResponse`].
#[derive(Debug, Serialize)]
pub struct IngestionStatusResponse {
    /// Whether the loop is running in this process.
    pub running: bool,
    pub state: IngestionState,
    #[serde(flatten)]
    pub stats: IngestionStats,
}

/// Store part of [`StatusResponse`].
#[derive(Debug, Serialize)]
pub struct StoreStatusResponse {
    pub path: Option<String>,
    pub readings: u64,
    pub latest: Option<Reading>,
}

/// Ingestion and store status.
async fn get_status(State(state): State<Arc<AppState>>) -> Result<Json<StatusResponse>, AppError> {
    let readings = state.query.count().await?;
    let latest = state.query.latest().await?;

    Ok(Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION"),
        started_at: state.started_at,
        ingestion: IngestionStatusResponse {
            running: state.ingestion.is_running(),
            state: state.ingestion.state(),
            stats: state.ingestion.stats().await,
        },
        store: StoreStatusResponse {
            path: state.store.path().map(|p| p.display().to_string()),
            readings,
            latest,
        },
    }))
}

/// Query parameters for `/api/readings`.
#[derive(Debug, Default, Deserialize)]
pub struct ReadingsQuery {
    /// RFC 3339 lower bound; defaults to the configured window before now.
    pub start: Option<String>,
    /// RFC 3339 upper bound; defaults to now.
    pub end: Option<String>,
}

/// Readings within a time range, ordered by id.
async fn get_readings(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ReadingsQuery>,
) -> Result<Json<Vec<Reading>>, AppError> {
    let readings = state
        .query
        .range(query.start.as_deref(), query.end.as_deref())
        .await?;
    Ok(Json(readings))
}

/// Every stored key, ascending.
async fn get_keys(State(state): State<Arc<AppState>>) -> Result<Json<Vec<String>>, AppError> {
    Ok(Json(state.query.all_keys().await?))
}

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Query(QueryError),
    Unavailable(String),
}

impl From<QueryError> for AppError {
    fn from(e: QueryError) -> Self {
        match e {
            QueryError::InvalidTimeRange(msg) => AppError::BadRequest(msg),
            QueryError::Cancelled => AppError::Unavailable("service is shutting down".to_string()),
            other => AppError::Query(other),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Query(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
        };

        if status.is_server_error() {
            tracing::error!("Request failed: {}", message);
        }

        let body = serde_json::json!({
            "error": message,
        });

        (status, Json(body)).into_response()
    }
}
