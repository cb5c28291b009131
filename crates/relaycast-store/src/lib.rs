//! # Relaycast Store
//!
//! SQLite persistence for the two durable pieces of state:
//! - `submissions`: one record per identity, guarded by the staleness fence
//! - `intake_queue`: at-least-once work queue with claim expiry
//!
//! Timestamps are stored as integer microseconds so fence comparisons run
//! inside a single statement.

pub mod queue;
pub mod records;

pub use queue::SqliteQueue;
pub use records::SqliteRecordStore;

use chrono::{DateTime, Utc};
use relaycast_core::error::RelayError;
use rusqlite::Connection;

pub(crate) fn to_micros(t: DateTime<Utc>) -> i64 {
    t.timestamp_micros()
}

pub(crate) fn from_micros(v: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(v).unwrap_or_default()
}

/// Whether `table` already has `column` (used by additive migrations).
pub(crate) fn has_column(conn: &Connection, table: &str, column: &str) -> rusqlite::Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
    for name in names {
        if name? == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub(crate) fn store_err(e: rusqlite::Error) -> RelayError {
    RelayError::Store(e.to_string())
}

pub(crate) fn queue_err(e: rusqlite::Error) -> RelayError {
    RelayError::Queue(e.to_string())
}
