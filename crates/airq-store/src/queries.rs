//! Time bounds for range queries.
//!
//! A [`TimeRange`] is translated into key bounds with
//! [`SampleStore::key_bounds`](crate::SampleStore::key_bounds) and then
//! scanned with [`SampleStore::range_scan`](crate::SampleStore::range_scan).
//!
//! # Example
//!
//! ```
//! use airq_store::{SampleStore, TimeRange};
//! use time::{Duration, OffsetDateTime};
//!
//! let store = SampleStore::open_in_memory()?;
//! let now = OffsetDateTime::now_utc();
//! store.append(10.0, 20.0, now)?;
//!
//! let range = TimeRange::last(Duration::minutes(15), now);
//! let readings = store.scan_time_range(&range)?;
//! assert_eq!(readings.len(), 1);
//! # Ok::<(), airq_store::Error>(())
//! ```

use time::{Duration, OffsetDateTime, PrimitiveDateTime};

/// An inclusive time interval `[since, until]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    since: OffsetDateTime,
    until: OffsetDateTime,
}

/// Returned by [`TimeRange::new`] when `since` is after `until`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("range start {since} is after range end {until}")]
pub struct InvertedRange {
    pub since: OffsetDateTime,
    pub until: OffsetDateTime,
}

impl TimeRange {
    /// Create a range, rejecting `since > until`.
    pub fn new(since: OffsetDateTime, until: OffsetDateTime) -> Result<Self, InvertedRange> {
        if since > until {
            return Err(InvertedRange { since, until });
        }
        Ok(Self { since, until })
    }

    /// The window of length `window` ending at `until`.
    ///
    /// Negative windows are treated as empty windows ending at `until`. A
    /// window reaching past the earliest representable time starts there.
    pub fn last(window: Duration, until: OffsetDateTime) -> Self {
        let window = window.max(Duration::ZERO);
        let since = until
            .checked_sub(window)
            .unwrap_or_else(|| PrimitiveDateTime::MIN.assume_utc());
        Self { since, until }
    }

    /// Inclusive lower bound.
    pub fn since(&self) -> OffsetDateTime {
        self.since
    }

    /// Inclusive upper bound.
    pub fn until(&self) -> OffsetDateTime {
        self.until
    }

    /// Whether `t` falls within the range, both ends inclusive.
    pub fn contains(&self, t: OffsetDateTime) -> bool {
        self.since <= t && t <= self.until
    }
}
