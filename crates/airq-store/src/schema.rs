//! Database schema.
//!
//! The database is laid out as an ordered key/value bucket:
//!
//! - `buckets` holds one persisted sequence counter per bucket
//! - `readings` maps a fixed-width key to a JSON-encoded reading; `id` and
//!   `created_at` are duplicated out of the value so time bounds can be
//!   translated into keys through an index

use rusqlite::Connection;

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Name of the bucket that holds readings.
pub const READINGS_BUCKET: &str = "readings";

/// Initialize the database schema.
pub fn initialize(conn: &Connection) -> rusqlite::Result<()> {
    let version = get_schema_version(conn)?;

    if version == 0 {
        create_schema_v1(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    }

    Ok(())
}

/// Get the current schema version.
fn get_schema_version(conn: &Connection) -> rusqlite::Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='schema_version'",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    conn.query_row("SELECT version FROM schema_version", [], |row| row.get(0))
}

/// Set the schema version.
fn set_schema_version(conn: &Connection, version: i32) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, ?)",
        [version],
    )?;
    Ok(())
}

/// Create the initial schema (version 1).
fn create_schema_v1(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            version INTEGER NOT NULL
        );

        -- Persisted sequence per bucket; never reset
        CREATE TABLE IF NOT EXISTS buckets (
            name TEXT PRIMARY KEY,
            sequence INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS readings (
            key TEXT PRIMARY KEY,
            id INTEGER NOT NULL UNIQUE,
            created_at INTEGER NOT NULL,
            value TEXT NOT NULL
        ) WITHOUT ROWID;
        CREATE INDEX IF NOT EXISTS idx_readings_created_at
            ON readings(created_at);
        "#,
    )
}
