//! Main store implementation.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use time::{OffsetDateTime, UtcOffset};
use tracing::{debug, info};

use airq_types::{Reading, Sample};

use crate::error::{Error, Result};
use crate::models::{SampleKey, decode_value, encode_value, parse_key};
use crate::queries::TimeRange;
use crate::schema::{self, READINGS_BUCKET};

/// Default time to wait for the database lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(1);

/// Options for [`SampleStore::open`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    /// How long to wait for another writer to release the lock before
    /// failing the operation.
    pub lock_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

impl StoreOptions {
    /// Set the lock timeout.
    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }
}

/// Append-only ordered store of sensor readings.
///
/// File-backed stores keep a writer connection and a separate read-only
/// connection in WAL mode, so scans see a consistent snapshot and never wait
/// on an in-flight append. The store is `Send + Sync` and meant to be shared
/// behind an `Arc`.
pub struct SampleStore {
    writer: Mutex<Connection>,
    reader: Option<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for SampleStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SampleStore {
    /// Open or create a database at the given path.
    ///
    /// Opening is idempotent: an existing database keeps its readings and
    /// its sequence.
    pub fn open<P: AsRef<Path>>(path: P, options: &StoreOptions) -> Result<Self> {
        let path = path.as_ref();

        // Create parent directories if needed
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        info!("Opening database at {}", path.display());
        let open_err = |source| Error::Open {
            path: path.to_path_buf(),
            source,
        };

        let writer = Connection::open(path).map_err(open_err)?;
        writer.busy_timeout(options.lock_timeout).map_err(open_err)?;
        writer
            .execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;",
            )
            .map_err(open_err)?;
        schema::initialize(&writer).map_err(open_err)?;

        let reader = Connection::open(path).map_err(open_err)?;
        reader.busy_timeout(options.lock_timeout).map_err(open_err)?;
        reader
            .execute_batch("PRAGMA query_only = ON;")
            .map_err(open_err)?;

        Ok(Self {
            writer: Mutex::new(writer),
            reader: Some(Mutex::new(reader)),
            path: Some(path.to_path_buf()),
        })
    }

    /// Open the default database location.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::default_db_path(), &StoreOptions::default())
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let open_err = |source| Error::Open {
            path: PathBuf::from(":memory:"),
            source,
        };
        let conn = Connection::open_in_memory().map_err(open_err)?;
        schema::initialize(&conn).map_err(open_err)?;
        Ok(Self {
            writer: Mutex::new(conn),
            reader: None,
            path: None,
        })
    }

    /// Path of the database file, if file-backed.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    // === Writes ===

    /// Persist a reading stamped with `now`.
    ///
    /// The id comes from the bucket's persisted sequence and is strictly
    /// greater than every id issued before, including across restarts. The
    /// sequence bump and the insert commit together or not at all.
    pub fn append(&self, pm25: f64, pm10: f64, now: OffsetDateTime) -> Result<Reading> {
        let created_at = now.to_offset(UtcOffset::UTC);
        let created_nanos = to_nanos(created_at)?;

        let mut conn = lock(&self.writer);
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(Error::Write)?;

        tx.execute(
            "INSERT OR IGNORE INTO buckets (name, sequence) VALUES (?1, 0)",
            [READINGS_BUCKET],
        )
        .map_err(Error::Write)?;
        let sequence: i64 = tx
            .query_row(
                "UPDATE buckets SET sequence = sequence + 1 WHERE name = ?1 RETURNING sequence",
                [READINGS_BUCKET],
                |row| row.get(0),
            )
            .map_err(Error::Write)?;

        let id = u64::try_from(sequence).map_err(|_| Error::CorruptRecord {
            key: READINGS_BUCKET.to_string(),
            reason: format!("negative sequence {sequence}"),
        })?;
        let reading = Reading {
            id,
            pm25,
            pm10,
            created_at,
        };
        let key = SampleKey::new(id);

        tx.execute(
            "INSERT INTO readings (key, id, created_at, value) VALUES (?1, ?2, ?3, ?4)",
            params![key.to_string(), sequence, created_nanos, encode_value(&reading)?],
        )
        .map_err(Error::Write)?;
        tx.commit().map_err(Error::Write)?;

        debug!("Stored reading {} ({} {})", key, pm25, pm10);
        Ok(reading)
    }

    /// Persist a decoded sample stamped with `now`.
    pub fn append_sample(&self, sample: Sample, now: OffsetDateTime) -> Result<Reading> {
        self.append(sample.pm25, sample.pm10, now)
    }

    // === Reads ===

    /// All readings with `start <= key <= end`, in ascending key order.
    ///
    /// An inverted or empty range yields an empty vector.
    pub fn range_scan(&self, start: SampleKey, end: SampleKey) -> Result<Vec<Reading>> {
        if start > end {
            return Ok(Vec::new());
        }

        let mut conn = self.reader();
        let tx = conn.transaction().map_err(Error::Read)?;
        let rows: Vec<(String, String)> = {
            let mut stmt = tx
                .prepare(
                    "SELECT key, value FROM readings
                     WHERE key >= ?1 AND key <= ?2
                     ORDER BY key ASC",
                )
                .map_err(Error::Read)?;
            stmt.query_map(params![start.to_string(), end.to_string()], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .map_err(Error::Read)?
            .collect::<rusqlite::Result<_>>()
            .map_err(Error::Read)?
        };
        tx.finish().map_err(Error::Read)?;

        rows.into_iter()
            .map(|(key, value)| decode_value(&key, &value))
            .collect()
    }

    /// Every key in the store, ascending.
    pub fn all_keys(&self) -> Result<Vec<SampleKey>> {
        let conn = self.reader();
        let mut stmt = conn
            .prepare("SELECT key FROM readings ORDER BY key ASC")
            .map_err(Error::Read)?;
        let raw: Vec<String> = stmt
            .query_map([], |row| row.get(0))
            .map_err(Error::Read)?
            .collect::<rusqlite::Result<_>>()
            .map_err(Error::Read)?;

        raw.iter().map(|key| parse_key(key)).collect()
    }

    /// The smallest and largest key whose reading was created within `range`.
    ///
    /// Returns `None` when no reading falls in the range.
    pub fn key_bounds(&self, range: &TimeRange) -> Result<Option<(SampleKey, SampleKey)>> {
        let conn = self.reader();
        let (first, last): (Option<String>, Option<String>) = conn
            .query_row(
                "SELECT MIN(key), MAX(key) FROM readings
                 WHERE created_at >= ?1 AND created_at <= ?2",
                params![clamp_nanos(range.since()), clamp_nanos(range.until())],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(Error::Read)?;

        match (first, last) {
            (Some(first), Some(last)) => Ok(Some((parse_key(&first)?, parse_key(&last)?))),
            _ => Ok(None),
        }
    }

    /// Readings created within `range`, in ascending key order.
    pub fn scan_time_range(&self, range: &TimeRange) -> Result<Vec<Reading>> {
        let Some((start, end)) = self.key_bounds(range)? else {
            return Ok(Vec::new());
        };

        Ok(self
            .range_scan(start, end)?
            .into_iter()
            .filter(|reading| range.contains(reading.created_at))
            .collect())
    }

    /// The most recently appended reading.
    pub fn latest(&self) -> Result<Option<Reading>> {
        let conn = self.reader();
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT key, value FROM readings ORDER BY key DESC LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(Error::Read)?;

        row.map(|(key, value)| decode_value(&key, &value))
            .transpose()
    }

    /// Number of stored readings.
    pub fn count(&self) -> Result<u64> {
        let conn = self.reader();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM readings", [], |row| row.get(0))
            .map_err(Error::Read)?;
        Ok(count.max(0) as u64)
    }

    fn reader(&self) -> MutexGuard<'_, Connection> {
        lock(self.reader.as_ref().unwrap_or(&self.writer))
    }
}

fn lock(conn: &Mutex<Connection>) -> MutexGuard<'_, Connection> {
    conn.lock().unwrap_or_else(PoisonError::into_inner)
}

fn to_nanos(t: OffsetDateTime) -> Result<i64> {
    i64::try_from(t.unix_timestamp_nanos())
        .map_err(|_| Error::InvalidTimestamp(format!("{t} is outside the indexable range")))
}

fn clamp_nanos(t: OffsetDateTime) -> i64 {
    t.unix_timestamp_nanos()
        .clamp(i64::MIN as i128, i64::MAX as i128) as i64
}
