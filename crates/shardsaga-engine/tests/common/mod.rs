// Shared fixtures for coordinator tests: a scripted in-memory shard
// connection with a journal shared across data sources, and statement
// builders for the t_order table.
#![allow(dead_code)]

use async_trait::async_trait;
use shardsaga_core::errors::{ExError, ExErrorKind, Result};
use shardsaga_core::model::{
    Assignment, ColumnMetadata, Condition, DataNode, InsertStatement, InsertValue,
    LogicSqlTransaction, Predicate, RouteResult, RouteUnit, SqlStatement, SqlValue,
    TableMetadata, TableUnit, UpdateStatement, ValueExpr,
};
use shardsaga_core::{
    CompensationAttempt, ExecutionRecord, ForwardOutcome, RowImage, SagaConfig, SagaPersistence,
    SagaState, ShardConnection,
};
use shardsaga_core_types::SagaId;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallKind {
    Begin,
    Query,
    Execute,
    Commit,
    Rollback,
}

#[derive(Debug, Clone)]
pub struct Call {
    pub data_source: String,
    pub kind: CallKind,
    pub sql: String,
    pub parameters: Vec<SqlValue>,
}

/// Every call made on every scripted connection, in the order made
#[derive(Clone, Default)]
pub struct Journal {
    calls: Arc<Mutex<Vec<Call>>>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, data_source: &str, kind: CallKind, sql: &str, parameters: &[SqlValue]) {
        self.calls.lock().unwrap().push(Call {
            data_source: data_source.to_string(),
            kind,
            sql: sql.to_string(),
            parameters: parameters.to_vec(),
        });
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// SQL of every execute call whose text starts with `prefix`
    pub fn executed(&self, prefix: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.kind == CallKind::Execute && c.sql.starts_with(prefix))
            .collect()
    }

    pub fn count(&self, data_source: &str, kind: CallKind) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.data_source == data_source && c.kind == kind)
            .count()
    }
}

struct Failure {
    sql_prefix: String,
    remaining: u32,
}

/// In-memory connection answering from a script
pub struct ScriptedConnection {
    data_source: String,
    journal: Journal,
    rows: Vec<RowImage>,
    generated_keys: Vec<SqlValue>,
    failures: Vec<Failure>,
    delay: Duration,
}

impl ScriptedConnection {
    pub fn new(data_source: &str, journal: &Journal) -> Self {
        Self {
            data_source: data_source.to_string(),
            journal: journal.clone(),
            rows: Vec::new(),
            generated_keys: Vec::new(),
            failures: Vec::new(),
            delay: Duration::ZERO,
        }
    }

    /// Rows every snapshot query returns; also the affected-row count
    pub fn with_rows(mut self, rows: Vec<RowImage>) -> Self {
        self.rows = rows;
        self
    }

    pub fn with_generated_keys(mut self, keys: Vec<SqlValue>) -> Self {
        self.generated_keys = keys;
        self
    }

    /// Fail the next `times` executes whose SQL starts with `sql_prefix`
    pub fn failing(mut self, sql_prefix: &str, times: u32) -> Self {
        self.failures.push(Failure {
            sql_prefix: sql_prefix.to_string(),
            remaining: times,
        });
        self
    }

    pub fn always_failing(self, sql_prefix: &str) -> Self {
        self.failing(sql_prefix, u32::MAX)
    }

    /// Sleep inside every execute
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl ShardConnection for ScriptedConnection {
    async fn begin(&mut self) -> Result<()> {
        self.journal.push(&self.data_source, CallKind::Begin, "", &[]);
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.journal.push(&self.data_source, CallKind::Commit, "", &[]);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.journal
            .push(&self.data_source, CallKind::Rollback, "", &[]);
        Ok(())
    }

    async fn query(&mut self, sql: &str, parameters: &[SqlValue]) -> Result<Vec<RowImage>> {
        self.journal
            .push(&self.data_source, CallKind::Query, sql, parameters);
        Ok(self.rows.clone())
    }

    async fn execute(&mut self, sql: &str, parameters: &[SqlValue]) -> Result<ForwardOutcome> {
        self.journal
            .push(&self.data_source, CallKind::Execute, sql, parameters);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        for failure in &mut self.failures {
            if failure.remaining > 0 && sql.starts_with(&failure.sql_prefix) {
                failure.remaining = failure.remaining.saturating_sub(1);
                return Err(ExError::new(ExErrorKind::Database)
                    .with_data_source(self.data_source.clone())
                    .with_message("connection reset"));
            }
        }
        let affected = if sql.starts_with("INSERT") {
            1
        } else {
            self.rows.len().max(1) as u64
        };
        Ok(ForwardOutcome::new(affected).with_generated_keys(self.generated_keys.clone()))
    }
}

/// Hook recording everything it is told; optionally failing every call
#[derive(Default)]
pub struct RecordingPersistence {
    pub fail: bool,
    pub states: Mutex<Vec<(SagaId, SagaState)>>,
    pub records: Mutex<Vec<ExecutionRecord>>,
    pub attempts: Mutex<Vec<CompensationAttempt>>,
}

impl RecordingPersistence {
    fn outcome(&self) -> Result<()> {
        if self.fail {
            return Err(ExError::new(ExErrorKind::Persistence).with_message("log is read-only"));
        }
        Ok(())
    }
}

impl SagaPersistence for RecordingPersistence {
    fn saga_state_changed(&self, saga_id: &SagaId, state: SagaState) -> Result<()> {
        self.states.lock().unwrap().push((saga_id.clone(), state));
        self.outcome()
    }

    fn forward_succeeded(&self, record: &ExecutionRecord) -> Result<()> {
        self.records.lock().unwrap().push(record.clone());
        self.outcome()
    }

    fn compensation_attempted(&self, attempt: &CompensationAttempt) -> Result<()> {
        self.attempts.lock().unwrap().push(attempt.clone());
        self.outcome()
    }
}

/// Defaults with retry delays removed
pub fn fast_config() -> SagaConfig {
    SagaConfig {
        transaction_retry_delay_milliseconds: 0,
        compensation_retry_delay_milliseconds: 0,
        ..SagaConfig::default()
    }
}

pub fn order_metadata() -> TableMetadata {
    TableMetadata::new(
        "t_order",
        vec![
            ColumnMetadata::new("order_id", true),
            ColumnMetadata::new("user_id", false),
            ColumnMetadata::new("status", false),
        ],
    )
}

pub fn order_row(order_id: i64, status: &str) -> RowImage {
    RowImage::new()
        .with("order_id", order_id)
        .with("status", status)
}

/// `UPDATE t_order SET status = ? WHERE user_id = ?` routed to each
/// `(data source, actual table)` pair, in order
pub fn update_status(status: &str, user_id: i64, routes: &[(&str, &str)]) -> LogicSqlTransaction {
    let statement = SqlStatement::Update(UpdateStatement {
        table: "t_order".into(),
        alias: None,
        assignments: vec![Assignment::new("status", ValueExpr::Parameter(0))],
        predicate: Predicate::Conditions(vec![Condition::new("user_id", ValueExpr::Parameter(1))]),
    });
    let parameters = vec![SqlValue::from(status), SqlValue::from(user_id)];
    let units = routes
        .iter()
        .map(|(ds, table)| {
            RouteUnit::new(
                *ds,
                format!("UPDATE {} SET status = ? WHERE user_id = ?", table),
                parameters.clone(),
            )
        })
        .collect();
    LogicSqlTransaction::new(
        "UPDATE t_order SET status = ? WHERE user_id = ?",
        statement,
        RouteResult::new(units, table_units(routes)),
        order_metadata(),
    )
}

/// `INSERT INTO t_order (user_id, status) VALUES (?, ?)` with a
/// database-generated order_id, routed to one shard
pub fn insert_generated(data_source: &str, actual_table: &str) -> LogicSqlTransaction {
    let parameters = vec![SqlValue::from(1), SqlValue::from("init")];
    let statement = SqlStatement::Insert(InsertStatement {
        table: "t_order".into(),
        columns: vec!["user_id".into(), "status".into()],
        values: vec![InsertValue {
            expressions: vec![ValueExpr::Parameter(0), ValueExpr::Parameter(1)],
            parameters: parameters.clone(),
            data_nodes: vec![DataNode::new(data_source, actual_table)],
        }],
        generated_key_column: Some("order_id".into()),
    });
    let unit = RouteUnit::new(
        data_source,
        format!("INSERT INTO {} (user_id, status) VALUES (?, ?)", actual_table),
        parameters,
    );
    LogicSqlTransaction::new(
        "INSERT INTO t_order (user_id, status) VALUES (?, ?)",
        statement,
        RouteResult::new(vec![unit], table_units(&[(data_source, actual_table)])),
        order_metadata(),
    )
}

fn table_units(routes: &[(&str, &str)]) -> Vec<TableUnit> {
    let mut units: Vec<TableUnit> = Vec::new();
    for (ds, table) in routes {
        // One actual table per data source; later pairs on the same source reuse it
        if !units.iter().any(|u| u.data_source_name == *ds) {
            units.push(TableUnit::new(*ds).route("t_order", *table));
        }
    }
    units
}
