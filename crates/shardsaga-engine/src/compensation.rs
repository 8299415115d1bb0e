//! Compensation of committed forward units
//!
//! Reverts run one at a time, newest first, across every statement of the
//! saga. Each revert unit runs in its own local transaction and is retried
//! on its own budget. A revert that exhausts its budget ends compensation:
//! older units stay applied and the saga needs an operator.

use crate::coordinator::SharedConnection;
use crate::log::ExecutionLog;
use crate::retry::RetryPolicy;
use shardsaga_core::errors::{ExError, ExErrorKind, Result};
use shardsaga_core::revert::RevertSqlUnit;
use shardsaga_core::{CompensationAttempt, ExecutionRecord, SagaPersistence, ShardConnection};
use shardsaga_core_types::schema::EVENT_RETRY;
use std::collections::HashMap;
use tokio::sync::Semaphore;

/// Replay every recorded revert unit in reverse completion order
///
/// # Errors
///
/// The failing revert's error once its budget is spent,
/// `ConnectionUnavailable` if a record's data source has no connection.
pub async fn compensate(
    log: &ExecutionLog,
    connections: &HashMap<String, SharedConnection>,
    executor: &Semaphore,
    persistence: &dyn SagaPersistence,
    retry: RetryPolicy,
) -> Result<usize> {
    let mut reverted = 0;
    for record in log.compensation_order() {
        let Some(revert) = &record.revert else {
            continue;
        };
        let conn = connections.get(&record.data_source).ok_or_else(|| {
            ExError::new(ExErrorKind::ConnectionUnavailable)
                .with_op("saga_compensate")
                .with_data_source(record.data_source.clone())
                .with_message("no connection registered for data source")
        })?;
        let _permit = executor.acquire().await.map_err(|e| {
            ExError::new(ExErrorKind::Internal)
                .with_op("saga_compensate")
                .with_message(e.to_string())
        })?;
        let mut conn = conn.lock().await;
        compensate_record(record, revert, &mut **conn, persistence, retry).await?;
        reverted += 1;
    }
    Ok(reverted)
}

async fn compensate_record(
    record: &ExecutionRecord,
    revert: &RevertSqlUnit,
    conn: &mut dyn ShardConnection,
    persistence: &dyn SagaPersistence,
    retry: RetryPolicy,
) -> Result<()> {
    let mut attempt = 1;
    loop {
        let result = apply_revert(conn, revert).await.map_err(|e| {
            let e = if e.is_retriable() {
                ExError::wrap(ExErrorKind::CompensationExecutionFailure, e)
            } else {
                e
            };
            e.with_op("saga_compensate")
                .with_data_source(record.data_source.clone())
                .with_table(record.actual_table.clone())
        });

        let report = CompensationAttempt {
            saga_id: record.saga_id.clone(),
            sequence: record.sequence,
            attempt,
            succeeded: result.is_ok(),
            error: result.as_ref().err().map(|e| e.to_string()),
        };
        if let Err(e) = persistence.compensation_attempted(&report) {
            tracing::warn!(
                saga_id = %record.saga_id,
                sequence = record.sequence,
                err_code = e.code(),
                error = %e,
                "compensation attempt not persisted"
            );
        }

        match result {
            Ok(()) => {
                tracing::info!(
                    saga_id = %record.saga_id,
                    sequence = record.sequence,
                    data_source = %record.data_source,
                    actual_table = %record.actual_table,
                    attempt,
                    rows = revert.parameters.len(),
                    "revert applied"
                );
                return Ok(());
            }
            Err(e) if e.is_retriable() && retry.allows_another(attempt) => {
                tracing::warn!(
                    event = EVENT_RETRY,
                    saga_id = %record.saga_id,
                    sequence = record.sequence,
                    data_source = %record.data_source,
                    actual_table = %record.actual_table,
                    attempt,
                    err_code = e.code(),
                    error = %e,
                    "revert failed, retrying"
                );
                retry.pause().await;
                attempt += 1;
            }
            Err(e) => {
                tracing::error!(
                    saga_id = %record.saga_id,
                    sequence = record.sequence,
                    data_source = %record.data_source,
                    actual_table = %record.actual_table,
                    attempt,
                    err_code = e.code(),
                    error = %e,
                    "revert failed for good"
                );
                return Err(e);
            }
        }
    }
}

/// Run every parameter tuple of `revert` in one local transaction
async fn apply_revert(conn: &mut dyn ShardConnection, revert: &RevertSqlUnit) -> Result<()> {
    conn.begin().await?;
    let mut result = Ok(());
    for parameters in &revert.parameters {
        if let Err(e) = conn.execute(&revert.sql, parameters).await {
            result = Err(e);
            break;
        }
    }
    if result.is_ok() {
        result = conn.commit().await;
    }
    if result.is_err() {
        if let Err(rollback_err) = conn.rollback().await {
            tracing::warn!(error = %rollback_err, "rollback after revert failure failed");
        }
    }
    result
}
