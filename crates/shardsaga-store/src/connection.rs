//! SQLite shard connection
//!
//! One `SqliteShardConnection` stands for one data source. Every call runs
//! on tokio's blocking pool since rusqlite is synchronous.

#![allow(clippy::result_large_err)]

use crate::errors::{database_error, internal_error, Result};
use crate::values::{from_sqlite, to_sqlite};
use async_trait::async_trait;
use rusqlite::Connection;
use shardsaga_core::model::SqlValue;
use shardsaga_core::{ForwardOutcome, RowImage, ShardConnection};
use std::path::Path;
use std::sync::{Arc, Mutex};

pub struct SqliteShardConnection {
    data_source: String,
    conn: Arc<Mutex<Connection>>,
}

impl SqliteShardConnection {
    pub fn new(data_source: impl Into<String>, conn: Connection) -> Self {
        Self {
            data_source: data_source.into(),
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Open the database file backing `data_source`
    pub fn open(data_source: impl Into<String>, path: impl AsRef<Path>) -> Result<Self> {
        let data_source = data_source.into();
        let conn = Connection::open(path).map_err(|e| database_error(&data_source, e))?;
        Ok(Self::new(data_source, conn))
    }

    pub fn data_source(&self) -> &str {
        &self.data_source
    }

    /// Run `f` against the connection on the blocking pool
    async fn with_conn<T, F>(&self, op: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let data_source = self.data_source.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|e| internal_error(op, format!("connection lock poisoned: {}", e)))?;
            f(&guard).map_err(|e| database_error(&data_source, e).with_op(op))
        })
        .await
        .map_err(|e| internal_error(op, e))?
    }
}

#[async_trait]
impl ShardConnection for SqliteShardConnection {
    async fn begin(&mut self) -> Result<()> {
        self.with_conn("sqlite_begin", |conn| conn.execute_batch("BEGIN"))
            .await
    }

    async fn commit(&mut self) -> Result<()> {
        self.with_conn("sqlite_commit", |conn| conn.execute_batch("COMMIT"))
            .await
    }

    async fn rollback(&mut self) -> Result<()> {
        self.with_conn("sqlite_rollback", |conn| {
            if conn.is_autocommit() {
                // Nothing open: the failed statement never began a transaction
                return Ok(());
            }
            conn.execute_batch("ROLLBACK")
        })
        .await
    }

    async fn query(&mut self, sql: &str, parameters: &[SqlValue]) -> Result<Vec<RowImage>> {
        let sql = sql.to_string();
        let values: Vec<_> = parameters.iter().map(to_sqlite).collect();
        self.with_conn("sqlite_query", move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let columns: Vec<String> = stmt
                .column_names()
                .into_iter()
                .map(|c| c.to_lowercase())
                .collect();
            let mut rows = stmt.query(rusqlite::params_from_iter(values))?;
            let mut images = Vec::new();
            while let Some(row) = rows.next()? {
                let mut image = RowImage::new();
                for (index, column) in columns.iter().enumerate() {
                    image.push(column, from_sqlite(row.get_ref(index)?));
                }
                images.push(image);
            }
            Ok(images)
        })
        .await
    }

    async fn execute(&mut self, sql: &str, parameters: &[SqlValue]) -> Result<ForwardOutcome> {
        let sql = sql.to_string();
        let values: Vec<_> = parameters.iter().map(to_sqlite).collect();
        self.with_conn("sqlite_execute", move |conn| {
            let changed = conn.execute(&sql, rusqlite::params_from_iter(values))? as u64;
            let is_insert = sql
                .trim_start()
                .get(..6)
                .is_some_and(|head| head.eq_ignore_ascii_case("INSERT"));
            let mut outcome = ForwardOutcome::new(changed);
            if is_insert && changed > 0 {
                // Rowids of one multi-row INSERT are assigned consecutively
                let last = conn.last_insert_rowid();
                let first = last - changed as i64 + 1;
                outcome =
                    outcome.with_generated_keys((first..=last).map(SqlValue::Integer).collect());
            }
            Ok(outcome)
        })
        .await
    }
}
