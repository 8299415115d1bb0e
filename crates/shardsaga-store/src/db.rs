//! SQLite handles for the saga log
//!
//! Recovery tooling reads the log while a coordinator still writes it, so a
//! handle waits out a locked database for [`BUSY_TIMEOUT`] and a file-backed
//! log journals in WAL mode. In-memory logs keep SQLite's `memory` journal.

#![allow(clippy::result_large_err)]

use crate::errors::{from_rusqlite, Result};
use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

/// How long a statement on the saga log waits for a competing writer
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Where a saga log lives
#[derive(Debug, Clone, Copy)]
pub enum Location<'a> {
    File(&'a Path),
    Memory,
}

/// Open the saga log database at `location`, ready for migrations
pub fn open_saga_db(location: Location<'_>) -> Result<Connection> {
    let conn = match location {
        Location::File(path) => Connection::open(path),
        Location::Memory => Connection::open_in_memory(),
    }
    .map_err(from_rusqlite)?;

    conn.busy_timeout(BUSY_TIMEOUT).map_err(from_rusqlite)?;
    conn.pragma_update(None, "foreign_keys", true)
        .map_err(from_rusqlite)?;
    let mode: String = conn
        .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
        .map_err(from_rusqlite)?;
    tracing::debug!(?location, journal_mode = %mode, "saga log database opened");
    Ok(conn)
}

/// Journal mode the connection ended up in (`wal`, `memory`, ...)
pub fn journal_mode(conn: &Connection) -> Result<String> {
    conn.pragma_query_value(None, "journal_mode", |row| row.get(0))
        .map_err(from_rusqlite)
}
