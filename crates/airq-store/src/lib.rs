//! Local persistence for particulate sensor readings.
//!
//! This crate stores readings in an append-only, ordered key/value layout on
//! top of SQLite. Every reading gets an id from a persisted sequence and is
//! stored under a fixed-width key derived from that id, so key order equals
//! insertion order.
//!
//! # Features
//!
//! - Atomic append with a monotonic id that survives restarts
//! - Inclusive, ascending range scans over keys
//! - Translation of time bounds into key bounds
//! - Concurrent readers alongside a single writer
//!
//! # Example
//!
//! ```no_run
//! use airq_store::{SampleStore, StoreOptions, SampleKey};
//! use time::OffsetDateTime;
//!
//! let store = SampleStore::open("airquality.db", &StoreOptions::default())?;
//! store.append(12.5, 30.1, OffsetDateTime::now_utc())?;
//!
//! for reading in store.range_scan(SampleKey::MIN, SampleKey::MAX)? {
//!     println!("{}: {} / {}", SampleKey::new(reading.id), reading.pm25, reading.pm10);
//! }
//! # Ok::<(), airq_store::Error>(())
//! ```

mod error;
mod models;
mod queries;
mod schema;
mod store;

pub use error::{Error, Result};
pub use models::{KEY_WIDTH, ParseKeyError, SampleKey};
pub use queries::{InvertedRange, TimeRange};
pub use store::{DEFAULT_LOCK_TIMEOUT, SampleStore, StoreOptions};

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/airq/airquality.db`
/// - macOS: `~/Library/Application Support/airq/airquality.db`
/// - Windows: `C:\Users\<user>\AppData\Local\airq\airquality.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("airq")
        .join("airquality.db")
}
