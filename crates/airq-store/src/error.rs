//! Error types for airq-store.

use std::path::PathBuf;

/// Result type for airq-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in airq-store.
///
/// Opening the store fails with [`Error::Open`] or [`Error::CreateDirectory`];
/// once open, writes fail with [`Error::Write`] and reads with [`Error::Read`].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The database could not be opened or initialized.
    #[error("Failed to open store at {path}: {source}")]
    Open {
        path: PathBuf,
        source: rusqlite::Error,
    },

    /// Failed to create database directory.
    #[error("Failed to create database directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A write transaction could not be committed.
    #[error("Store write failed: {0}")]
    Write(rusqlite::Error),

    /// A read transaction failed.
    #[error("Store read failed: {0}")]
    Read(rusqlite::Error),

    /// A stored value could not be decoded.
    #[error("Corrupt record at key {key}: {reason}")]
    CorruptRecord { key: String, reason: String },

    /// A timestamp is outside the range the store can index.
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error happened while opening the store.
    pub fn is_open_error(&self) -> bool {
        matches!(self, Self::Open { .. } | Self::CreateDirectory { .. })
    }

    /// Whether the write failed because another writer held the lock past
    /// the configured timeout.
    pub fn is_busy(&self) -> bool {
        match self {
            Self::Write(e) | Self::Read(e) => matches!(
                e.sqlite_error_code(),
                Some(rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked)
            ),
            _ => false,
        }
    }
}
