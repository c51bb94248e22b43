//! Read-side access to stored readings.
//!
//! [`QueryService`] resolves optional RFC 3339 bounds into a [`TimeRange`],
//! runs the store scan on the blocking pool and gives up early if the
//! process is shutting down.

use std::sync::Arc;

use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};
use tokio_util::sync::CancellationToken;

use airq_core::{Clock, SystemClock};
use airq_store::{SampleStore, TimeRange};
use airq_types::Reading;

/// Errors returned by [`QueryService`].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum QueryError {
    /// A bound could not be parsed, or start is after end.
    #[error("Invalid time range: {0}")]
    InvalidTimeRange(String),
    /// The store failed the read.
    #[error(transparent)]
    Store(#[from] airq_store::Error),
    /// The blocking read task panicked.
    #[error("Query task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    /// Shutdown was requested before the query finished.
    #[error("Query cancelled")]
    Cancelled,
}

/// Result type for query operations.
pub type QueryResult<T> = std::result::Result<T, QueryError>;

/// Time-bounded and full-key queries over a [`SampleStore`].
#[derive(Clone)]
pub struct QueryService {
    store: Arc<SampleStore>,
    clock: Arc<dyn Clock>,
    default_window: Duration,
    cancel: CancellationToken,
}

impl std::fmt::Debug for QueryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryService")
            .field("store", &self.store)
            .field("default_window", &self.default_window)
            .finish_non_exhaustive()
    }
}

impl QueryService {
    /// Create a service over `store`; queries without a start cover the last
    /// `default_window`.
    pub fn new(store: Arc<SampleStore>, default_window: Duration) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            default_window,
            cancel: CancellationToken::new(),
        }
    }

    /// Use `clock` for "now".
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Fail in-flight and future queries once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Readings created within `[start, end]`, ordered by id.
    ///
    /// Bounds are RFC 3339 text; `None` and the empty string both mean
    /// "omitted". An omitted end is `now` and an omitted start is
    /// `end - default_window`.
    pub async fn range(&self, start: Option<&str>, end: Option<&str>) -> QueryResult<Vec<Reading>> {
        let start = parse_bound("start", start)?;
        let end = parse_bound("end", end)?;
        self.range_between(start, end).await
    }

    /// Typed form of [`QueryService::range`].
    pub async fn range_between(
        &self,
        start: Option<OffsetDateTime>,
        end: Option<OffsetDateTime>,
    ) -> QueryResult<Vec<Reading>> {
        let range = self.resolve(start, end)?;

        self.blocking(move |store| {
            let mut readings = store.scan_time_range(&range)?;
            readings.sort_by_key(|r| r.id);
            Ok(readings)
        })
        .await
    }

    /// Every stored key, ascending.
    pub async fn all_keys(&self) -> QueryResult<Vec<String>> {
        self.blocking(|store| {
            Ok(store
                .all_keys()?
                .into_iter()
                .map(|key| key.to_string())
                .collect())
        })
        .await
    }

    /// Number of stored readings.
    pub async fn count(&self) -> QueryResult<u64> {
        self.blocking(|store| store.count()).await
    }

    /// The most recently stored reading.
    pub async fn latest(&self) -> QueryResult<Option<Reading>> {
        self.blocking(|store| store.latest()).await
    }

    /// Apply defaults to optional bounds.
    pub fn resolve(
        &self,
        start: Option<OffsetDateTime>,
        end: Option<OffsetDateTime>,
    ) -> QueryResult<TimeRange> {
        let end = end.unwrap_or_else(|| self.clock.now_utc());
        match start {
            Some(start) => TimeRange::new(start, end)
                .map_err(|e| QueryError::InvalidTimeRange(e.to_string())),
            None => Ok(TimeRange::last(self.default_window, end)),
        }
    }

    async fn blocking<T, F>(&self, f: F) -> QueryResult<T>
    where
        F: FnOnce(&SampleStore) -> airq_store::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        if self.cancel.is_cancelled() {
            return Err(QueryError::Cancelled);
        }

        let store = Arc::clone(&self.store);
        let task = tokio::task::spawn_blocking(move || f(&store));

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(QueryError::Cancelled),
            joined = task => Ok(joined??),
        }
    }
}

fn parse_bound(name: &str, raw: Option<&str>) -> QueryResult<Option<OffsetDateTime>> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => OffsetDateTime::parse(s, &Rfc3339).map(Some).map_err(|e| {
            QueryError::InvalidTimeRange(format!("{} '{}' is not RFC 3339: {}", name, s, e))
        }),
    }
}
