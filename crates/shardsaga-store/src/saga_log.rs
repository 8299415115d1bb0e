//! Durable saga log
//!
//! Implements the coordinator's persistence hook on three SQLite tables and
//! offers the reads crash-recovery tooling needs: a saga's last state, its
//! execution records in completion order (with their revert units) and its
//! compensation attempts.

#![allow(clippy::result_large_err)]

use crate::db::{self, Location};
use crate::errors::{from_rusqlite, internal_error, Result};
use crate::migrations::apply_migrations;
use rusqlite::{Connection, OptionalExtension};
use shardsaga_core::config::PersistenceConfig;
use shardsaga_core::errors::{ExError, ExErrorKind};
use shardsaga_core::revert::RevertSqlUnit;
use shardsaga_core::{CompensationAttempt, ExecutionRecord, SagaPersistence, SagaState};
use shardsaga_core_types::SagaId;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

pub struct SqliteSagaLog {
    conn: Mutex<Connection>,
}

impl SqliteSagaLog {
    /// Open (or create) the log at `path` and bring its schema up to date
    ///
    /// # Errors
    ///
    /// `Persistence` if the file cannot be opened or a migration fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_connection(db::open_saga_db(Location::File(path.as_ref()))?)
    }

    /// In-memory log (for testing)
    ///
    /// # Errors
    ///
    /// `Persistence` if a migration fails.
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(db::open_saga_db(Location::Memory)?)
    }

    fn with_connection(mut conn: Connection) -> Result<Self> {
        apply_migrations(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// The log the configuration asks for, or `None` when persistence is off
    ///
    /// # Errors
    ///
    /// `InvalidConfig` when enabled without a path, otherwise as [`Self::open`].
    pub fn from_config(config: &PersistenceConfig) -> Result<Option<Self>> {
        if !config.enabled {
            return Ok(None);
        }
        let path = config.path.as_ref().ok_or_else(|| {
            ExError::new(ExErrorKind::InvalidConfig)
                .with_op("open_saga_log")
                .with_message("persistence.path: required when persistence is enabled")
        })?;
        Self::open(path).map(Some)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| internal_error("saga_log", format!("lock poisoned: {}", e)))
    }

    /// Last recorded state of a saga
    pub fn load_state(&self, saga_id: &SagaId) -> Result<Option<SagaState>> {
        let conn = self.lock()?;
        let state: Option<String> = conn
            .query_row(
                "SELECT state FROM saga_transactions WHERE saga_id = ?1",
                [saga_id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(from_rusqlite)?;
        state.map(|s| s.parse()).transpose()
    }

    /// Sagas whose last recorded state is not terminal, oldest first
    pub fn list_unfinished(&self) -> Result<Vec<(SagaId, SagaState)>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT saga_id, state FROM saga_transactions
                 WHERE state NOT IN ('COMMITTED', 'FAILED', 'COMPENSATED', 'COMPENSATION_FAILED')
                 ORDER BY created_at, saga_id",
            )
            .map_err(from_rusqlite)?;
        let rows: Vec<(String, String)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(from_rusqlite)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(from_rusqlite)?;
        rows.into_iter()
            .map(|(id, state)| Ok((SagaId::from_string(id), state.parse()?)))
            .collect()
    }

    /// Execution records of a saga in completion order
    pub fn load_records(&self, saga_id: &SagaId) -> Result<Vec<ExecutionRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT sequence, statement_index, unit_index, data_source, actual_table,
                        affected_rows, revert_json
                 FROM saga_execution_records
                 WHERE saga_id = ?1
                 ORDER BY sequence",
            )
            .map_err(from_rusqlite)?;
        let rows = stmt
            .query_map([saga_id.as_str()], |row| {
                let record = ExecutionRecord {
                    saga_id: saga_id.clone(),
                    sequence: row.get::<_, i64>(0)? as u64,
                    statement_index: row.get::<_, i64>(1)? as usize,
                    unit_index: row.get::<_, i64>(2)? as usize,
                    data_source: row.get(3)?,
                    actual_table: row.get(4)?,
                    affected_rows: row.get::<_, i64>(5)? as u64,
                    revert: None,
                };
                Ok((record, row.get::<_, Option<String>>(6)?))
            })
            .map_err(from_rusqlite)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(from_rusqlite)?;

        rows.into_iter()
            .map(|(mut record, revert_json)| {
                record.revert = revert_json
                    .map(|json| serde_json::from_str::<RevertSqlUnit>(&json))
                    .transpose()?;
                Ok(record)
            })
            .collect()
    }

    /// Compensation attempts of a saga, in the order they were made
    pub fn load_attempts(&self, saga_id: &SagaId) -> Result<Vec<CompensationAttempt>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT sequence, attempt, succeeded, error
                 FROM saga_compensation_attempts
                 WHERE saga_id = ?1
                 ORDER BY id",
            )
            .map_err(from_rusqlite)?;
        let attempts = stmt
            .query_map([saga_id.as_str()], |row| {
                Ok(CompensationAttempt {
                    saga_id: saga_id.clone(),
                    sequence: row.get::<_, i64>(0)? as u64,
                    attempt: row.get::<_, i64>(1)? as u32,
                    succeeded: row.get::<_, i64>(2)? != 0,
                    error: row.get(3)?,
                })
            })
            .map_err(from_rusqlite)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(from_rusqlite)?;
        Ok(attempts)
    }
}

impl SagaPersistence for SqliteSagaLog {
    fn saga_state_changed(&self, saga_id: &SagaId, state: SagaState) -> Result<()> {
        let now = chrono::Utc::now().timestamp_millis();
        self.lock()?
            .execute(
                "INSERT INTO saga_transactions (saga_id, state, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?3)
                 ON CONFLICT(saga_id) DO UPDATE SET
                    state = excluded.state,
                    updated_at = excluded.updated_at",
                rusqlite::params![saga_id.as_str(), state.as_str(), now],
            )
            .map_err(from_rusqlite)?;
        Ok(())
    }

    fn forward_succeeded(&self, record: &ExecutionRecord) -> Result<()> {
        let revert_json = record
            .revert
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let now = chrono::Utc::now().timestamp_millis();
        self.lock()?
            .execute(
                "INSERT INTO saga_execution_records
                    (saga_id, sequence, statement_index, unit_index, data_source,
                     actual_table, affected_rows, revert_json, recorded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                rusqlite::params![
                    record.saga_id.as_str(),
                    record.sequence as i64,
                    record.statement_index as i64,
                    record.unit_index as i64,
                    record.data_source,
                    record.actual_table,
                    record.affected_rows as i64,
                    revert_json,
                    now,
                ],
            )
            .map_err(from_rusqlite)?;
        Ok(())
    }

    fn compensation_attempted(&self, attempt: &CompensationAttempt) -> Result<()> {
        let now = chrono::Utc::now().timestamp_millis();
        self.lock()?
            .execute(
                "INSERT INTO saga_compensation_attempts
                    (saga_id, sequence, attempt, succeeded, error, attempted_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    attempt.saga_id.as_str(),
                    attempt.sequence as i64,
                    attempt.attempt,
                    if attempt.succeeded { 1 } else { 0 },
                    attempt.error,
                    now,
                ],
            )
            .map_err(from_rusqlite)?;
        Ok(())
    }
}
