//! Forward execution of route units
//!
//! A unit runs as one local transaction on its shard connection:
//! begin, capture the before-image, execute, synthesize the revert, commit.
//! Any failure rolls the local transaction back before the unit is retried,
//! so a committed unit always has its revert unit and an uncommitted one
//! left no trace.

use crate::retry::RetryPolicy;
use shardsaga_core::errors::{ExError, ExErrorKind, Result};
use shardsaga_core::model::RouteUnit;
use shardsaga_core::revert::{RevertPlan, RevertSqlUnit};
use shardsaga_core::{ForwardOutcome, ShardConnection};
use shardsaga_core_types::schema::EVENT_RETRY;
use shardsaga_core_types::{SagaId, Sensitive};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc::UnboundedSender;

/// A route unit together with its validated revert plan
#[derive(Debug, Clone)]
pub struct PlannedUnit {
    pub unit_index: usize,
    pub route_unit: RouteUnit,
    pub plan: RevertPlan,
}

impl PlannedUnit {
    pub fn data_source(&self) -> &str {
        &self.route_unit.data_source_name
    }
}

/// A unit that committed locally, reported in completion order
#[derive(Debug, Clone)]
pub struct CompletedUnit {
    pub unit_index: usize,
    pub data_source: String,
    pub actual_table: String,
    pub affected_rows: u64,
    pub revert: Option<RevertSqlUnit>,
}

/// Run the units of one data source in submission order
///
/// Stops before starting a unit once `abort` is set, and sets it when a unit
/// fails for good. Each committed unit is sent on `completed` right after
/// its local commit.
///
/// # Errors
///
/// The failing unit's error once its retry budget is spent, or immediately
/// for failures that are not retriable.
pub async fn run_group(
    saga_id: &SagaId,
    conn: &mut dyn ShardConnection,
    units: &[PlannedUnit],
    retry: RetryPolicy,
    abort: &AtomicBool,
    completed: &UnboundedSender<CompletedUnit>,
) -> Result<()> {
    for unit in units {
        if abort.load(Ordering::SeqCst) {
            tracing::debug!(
                saga_id = %saga_id,
                data_source = unit.data_source(),
                unit_index = unit.unit_index,
                "unit skipped after an earlier failure"
            );
            break;
        }
        match run_with_retry(saga_id, conn, unit, retry).await {
            Ok((outcome, revert)) => {
                let done = CompletedUnit {
                    unit_index: unit.unit_index,
                    data_source: unit.data_source().to_string(),
                    actual_table: unit.plan.actual_table().to_string(),
                    affected_rows: outcome.affected_rows,
                    revert,
                };
                // The coordinator drains the channel until every group has finished
                let _ = completed.send(done);
            }
            Err(e) => {
                abort.store(true, Ordering::SeqCst);
                return Err(e);
            }
        }
    }
    Ok(())
}

async fn run_with_retry(
    saga_id: &SagaId,
    conn: &mut dyn ShardConnection,
    unit: &PlannedUnit,
    retry: RetryPolicy,
) -> Result<(ForwardOutcome, Option<RevertSqlUnit>)> {
    let mut attempt = 1;
    loop {
        match run_once(conn, unit).await {
            Ok(done) => return Ok(done),
            Err(e) if e.is_retriable() && retry.allows_another(attempt) => {
                tracing::warn!(
                    event = EVENT_RETRY,
                    saga_id = %saga_id,
                    data_source = unit.data_source(),
                    actual_table = unit.plan.actual_table(),
                    attempt,
                    err_code = e.code(),
                    error = %e,
                    "forward unit failed, retrying"
                );
                retry.pause().await;
                attempt += 1;
            }
            Err(e) => {
                tracing::error!(
                    saga_id = %saga_id,
                    data_source = unit.data_source(),
                    actual_table = unit.plan.actual_table(),
                    attempt,
                    err_code = e.code(),
                    error = %e,
                    "forward unit failed"
                );
                return Err(e);
            }
        }
    }
}

async fn run_once(
    conn: &mut dyn ShardConnection,
    unit: &PlannedUnit,
) -> Result<(ForwardOutcome, Option<RevertSqlUnit>)> {
    conn.begin()
        .await
        .map_err(|e| forward_failure(e, unit, "forward_begin"))?;
    let result = match execute_in_transaction(conn, unit).await {
        Ok(done) => conn
            .commit()
            .await
            .map(|_| done)
            .map_err(|e| forward_failure(e, unit, "forward_commit")),
        Err(e) => Err(e),
    };
    if result.is_err() {
        if let Err(rollback_err) = conn.rollback().await {
            tracing::warn!(
                data_source = unit.data_source(),
                error = %rollback_err,
                "rollback after forward failure failed"
            );
        }
    }
    result
}

async fn execute_in_transaction(
    conn: &mut dyn ShardConnection,
    unit: &PlannedUnit,
) -> Result<(ForwardOutcome, Option<RevertSqlUnit>)> {
    let synthesizer = unit
        .plan
        .capture(conn)
        .await
        .map_err(|e| e.with_data_source(unit.data_source()))?;
    let sql_unit = &unit.route_unit.sql_unit;
    tracing::debug!(
        data_source = unit.data_source(),
        sql = %sql_unit.sql,
        parameters = ?Sensitive::new(&sql_unit.parameters),
        "executing forward unit"
    );
    let outcome = conn
        .execute(&sql_unit.sql, &sql_unit.parameters)
        .await
        .map_err(|e| forward_failure(e, unit, "forward_execute"))?;
    let revert = synthesizer
        .generate_revert_sql(&outcome)
        .map_err(|e| e.with_data_source(unit.data_source()))?;
    Ok((outcome, revert))
}

fn forward_failure(source: ExError, unit: &PlannedUnit, op: &str) -> ExError {
    if !source.is_retriable() {
        return source;
    }
    ExError::wrap(ExErrorKind::ForwardExecutionFailure, source)
        .with_op(op)
        .with_data_source(unit.data_source())
        .with_table(unit.plan.actual_table())
}
