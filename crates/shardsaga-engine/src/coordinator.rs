//! Saga execution coordinator
//!
//! ## Statement pipeline (in order):
//! 1. Plan every route unit (structural checks, no connection touched)
//! 2. Check every unit's data source has a connection
//! 3. ACTIVE -> EXECUTING
//! 4. Run units grouped by data source on a bounded worker pool; units of
//!    one data source run in submission order on its connection
//! 5. Append committed units to the execution log in completion order
//! 6. All units committed: EXECUTING -> ACTIVE
//! 7. A unit failed for good: FORWARD policy -> FAILED, BACKWARD policy ->
//!    COMPENSATING -> {COMPENSATED | COMPENSATION_FAILED}
//!
//! A failure in step 1 or 2 rejects the statement and leaves the saga ACTIVE.
//!
//! Statements and rollbacks run on a spawned task that holds the saga's
//! gate. Dropping the future returned by [`SagaCoordinator::execute`] or
//! [`SagaCoordinator::rollback`] does not stop that task: every unit it
//! commits still lands in the execution log and the persistence hook, and
//! the saga still reaches ACTIVE or a terminal state. The next operation on
//! the saga waits for it.

use crate::compensation::compensate;
use crate::forward::{run_group, CompletedUnit, PlannedUnit};
use crate::retry::RetryPolicy;
use crate::saga::SagaTransaction;
use shardsaga_core::errors::{ExError, ExErrorKind, Result};
use shardsaga_core::model::LogicSqlTransaction;
use shardsaga_core::revert::RevertEngineFactory;
use shardsaga_core::{
    log_op_end, log_op_error, log_op_start, ExecutionRecord, NoopSagaPersistence,
    RecoveryPolicy, SagaConfig, SagaPersistence, SagaState, ShardConnection,
};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex, OwnedMutexGuard, Semaphore};
use tokio::task::JoinSet;

/// A data source's connection, owned by one route unit at a time
pub type SharedConnection = Arc<Mutex<Box<dyn ShardConnection>>>;

/// What happened to one logical statement
#[derive(Debug, Clone)]
pub enum StatementOutcome {
    /// Every route unit committed; the saga is ACTIVE again
    Applied { units: usize },
    /// A unit exhausted its retries under forward recovery; the saga is FAILED
    ForwardFailed { error: ExError },
    /// A unit failed and every committed unit of the saga was reverted
    Compensated { error: ExError, reverted: usize },
    /// A unit failed and a revert then failed too; the saga needs an operator
    CompensationFailed {
        error: ExError,
        compensation_error: ExError,
    },
}

impl StatementOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatementOutcome::Applied { .. } => "applied",
            StatementOutcome::ForwardFailed { .. } => "forward_failed",
            StatementOutcome::Compensated { .. } => "compensated",
            StatementOutcome::CompensationFailed { .. } => "compensation_failed",
        }
    }
}

/// What happened to an explicit rollback
#[derive(Debug, Clone)]
pub enum RollbackOutcome {
    Compensated { reverted: usize },
    CompensationFailed { error: ExError },
}

/// Runs statements and rollbacks of sagas over registered shard connections
///
/// Cloning is cheap; clones share connections, hook and worker pool.
#[derive(Clone)]
pub struct SagaCoordinator {
    config: Arc<SagaConfig>,
    connections: Arc<HashMap<String, SharedConnection>>,
    persistence: Arc<dyn SagaPersistence>,
    executor: Arc<Semaphore>,
}

impl SagaCoordinator {
    /// # Errors
    ///
    /// `InvalidConfig` if the configuration does not validate.
    pub fn new(config: SagaConfig) -> Result<Self> {
        config.validate()?;
        let executor = Arc::new(Semaphore::new(config.executor_size));
        Ok(Self {
            config: Arc::new(config),
            connections: Arc::new(HashMap::new()),
            persistence: Arc::new(NoopSagaPersistence),
            executor,
        })
    }

    /// Register the connection route units on `data_source` run on
    pub fn with_connection(
        mut self,
        data_source: impl Into<String>,
        connection: impl ShardConnection + 'static,
    ) -> Self {
        Arc::make_mut(&mut self.connections).insert(
            data_source.into(),
            Arc::new(Mutex::new(Box::new(connection))),
        );
        self
    }

    pub fn with_persistence(mut self, persistence: Arc<dyn SagaPersistence>) -> Self {
        self.persistence = persistence;
        self
    }

    pub fn config(&self) -> &SagaConfig {
        &self.config
    }

    /// Start a saga in state ACTIVE
    pub fn begin(&self) -> SagaTransaction {
        let saga = SagaTransaction::new();
        if let Err(e) = self.persistence.saga_state_changed(saga.id(), saga.state()) {
            tracing::warn!(
                saga_id = %saga.id(),
                err_code = e.code(),
                error = %e,
                "saga start not persisted"
            );
        }
        tracing::info!(saga_id = %saga.id(), "saga started");
        saga
    }

    /// Run one logical statement on every shard it was routed to
    ///
    /// Waits for any operation still running on the saga first. The work
    /// itself runs detached: if this future is dropped, the statement still
    /// runs to completion (compensating under backward recovery) and
    /// [`SagaTransaction::wait_idle`] reports where it ended.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless the saga is ACTIVE. Structural failures
    /// (`UnsupportedStatement`, `MissingPrimaryKey`, `RouteResolutionFailure`,
    /// `ConnectionUnavailable`, ...) reject the statement before anything
    /// runs; the saga stays ACTIVE. Forward and compensation failures are
    /// reported through [`StatementOutcome`], not as errors.
    pub async fn execute(
        &self,
        saga: &mut SagaTransaction,
        transaction: LogicSqlTransaction,
    ) -> Result<StatementOutcome> {
        let gate = saga.acquire().await;
        let this = self.clone();
        let driver = saga.share();
        detached("saga_execute", gate, async move {
            this.execute_logged(&driver, transaction).await
        })
        .await
    }

    async fn execute_logged(
        &self,
        saga: &SagaTransaction,
        transaction: LogicSqlTransaction,
    ) -> Result<StatementOutcome> {
        log_op_start!(
            "saga_execute",
            saga_id = saga.id().as_str(),
            statement_index = saga.statement_count()
        );
        let start = Instant::now();

        let outcome = self.execute_impl(saga, transaction).await.map_err(|e| {
            log_op_error!(
                "saga_execute",
                e.clone(),
                duration_ms = start.elapsed().as_millis() as u64,
                saga_id = saga.id().as_str()
            );
            e
        })?;

        log_op_end!(
            "saga_execute",
            duration_ms = start.elapsed().as_millis() as u64,
            saga_id = saga.id().as_str(),
            outcome = outcome.as_str()
        );
        Ok(outcome)
    }

    async fn execute_impl(
        &self,
        saga: &SagaTransaction,
        transaction: LogicSqlTransaction,
    ) -> Result<StatementOutcome> {
        saga.require(SagaState::Active, "saga_execute")?;

        let planned = transaction
            .route_result
            .route_units
            .iter()
            .enumerate()
            .map(|(unit_index, unit)| {
                Ok(PlannedUnit {
                    unit_index,
                    route_unit: unit.clone(),
                    plan: RevertEngineFactory::new_plan(&transaction, unit)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let groups = self.group_by_data_source(planned)?;

        let statement_index = saga.accept(transaction);
        saga.transition(SagaState::Executing, self.persistence.as_ref())?;

        let (units, failure) = self.run_forward(saga, statement_index, groups).await;
        let Some(error) = failure else {
            saga.transition(SagaState::Active, self.persistence.as_ref())?;
            return Ok(StatementOutcome::Applied { units });
        };

        match self.config.recovery_policy {
            RecoveryPolicy::Forward => {
                saga.transition(SagaState::Failed, self.persistence.as_ref())?;
                Ok(StatementOutcome::ForwardFailed { error })
            }
            RecoveryPolicy::Backward => match self.compensate(saga).await? {
                RollbackOutcome::Compensated { reverted } => {
                    Ok(StatementOutcome::Compensated { error, reverted })
                }
                RollbackOutcome::CompensationFailed {
                    error: compensation_error,
                } => Ok(StatementOutcome::CompensationFailed {
                    error,
                    compensation_error,
                }),
            },
        }
    }

    /// Split units into per-data-source groups, keeping submission order
    fn group_by_data_source(
        &self,
        planned: Vec<PlannedUnit>,
    ) -> Result<Vec<(SharedConnection, Vec<PlannedUnit>)>> {
        let mut groups: Vec<(String, SharedConnection, Vec<PlannedUnit>)> = Vec::new();
        for unit in planned {
            if let Some(group) = groups.iter_mut().find(|g| g.0 == unit.data_source()) {
                group.2.push(unit);
                continue;
            }
            let conn = self.connection(unit.data_source())?;
            groups.push((unit.data_source().to_string(), conn, vec![unit]));
        }
        Ok(groups
            .into_iter()
            .map(|(_, conn, units)| (conn, units))
            .collect())
    }

    fn connection(&self, data_source: &str) -> Result<SharedConnection> {
        self.connections.get(data_source).cloned().ok_or_else(|| {
            ExError::new(ExErrorKind::ConnectionUnavailable)
                .with_op("saga_execute")
                .with_data_source(data_source)
                .with_message("no connection registered for data source")
        })
    }

    /// Run every group, logging each committed unit as it is reported
    ///
    /// Returns the number of committed units and the first failure, if any.
    /// All groups have finished when this returns.
    async fn run_forward(
        &self,
        saga: &SagaTransaction,
        statement_index: usize,
        groups: Vec<(SharedConnection, Vec<PlannedUnit>)>,
    ) -> (usize, Option<ExError>) {
        let retry = RetryPolicy::forward(&self.config);
        let abort = Arc::new(AtomicBool::new(false));
        let (completed_tx, mut completed_rx) = mpsc::unbounded_channel::<CompletedUnit>();
        let mut join_set = JoinSet::new();

        for (conn, units) in groups {
            let executor = Arc::clone(&self.executor);
            let abort = Arc::clone(&abort);
            let completed_tx = completed_tx.clone();
            let saga_id = saga.id().clone();
            join_set.spawn(async move {
                let _permit = executor.acquire_owned().await.map_err(|e| {
                    ExError::new(ExErrorKind::Internal)
                        .with_op("saga_execute")
                        .with_message(e.to_string())
                })?;
                let mut conn = conn.lock_owned().await;
                run_group(&saga_id, &mut **conn, &units, retry, &abort, &completed_tx).await
            });
        }
        drop(completed_tx);

        let mut units = 0;
        let mut failure = None;
        loop {
            tokio::select! {
                biased;
                Some(done) = completed_rx.recv() => {
                    self.record_completion(saga, statement_index, done);
                    units += 1;
                }
                joined = join_set.join_next() => {
                    let Some(joined) = joined else { break };
                    let result = joined.map_err(|e| {
                        ExError::new(ExErrorKind::Internal)
                            .with_op("saga_execute")
                            .with_message(format!("unit task failed: {}", e))
                    });
                    if let Err(e) = result.and_then(|r| r) {
                        failure.get_or_insert(e);
                    }
                }
            }
        }
        // Units the last groups reported just before finishing
        while let Ok(done) = completed_rx.try_recv() {
            self.record_completion(saga, statement_index, done);
            units += 1;
        }
        (units, failure)
    }

    /// Append a committed unit to the log and hand it to the hook
    fn record_completion(
        &self,
        saga: &SagaTransaction,
        statement_index: usize,
        done: CompletedUnit,
    ) {
        let record = saga.append_with(|sequence| ExecutionRecord {
            saga_id: saga.id().clone(),
            sequence,
            statement_index,
            unit_index: done.unit_index,
            data_source: done.data_source,
            actual_table: done.actual_table,
            affected_rows: done.affected_rows,
            revert: done.revert,
        });
        if let Err(e) = self.persistence.forward_succeeded(&record) {
            tracing::warn!(
                saga_id = %record.saga_id,
                sequence = record.sequence,
                err_code = e.code(),
                error = %e,
                "execution record not persisted"
            );
        }
    }

    /// Finish the saga
    ///
    /// # Errors
    ///
    /// `InvalidState` unless the saga is ACTIVE with nothing running on it.
    pub fn commit(&self, saga: &mut SagaTransaction) -> Result<()> {
        log_op_start!("saga_commit", saga_id = saga.id().as_str());
        let start = Instant::now();

        saga.try_acquire("saga_commit")
            .and_then(|_gate| {
                saga.require(SagaState::Active, "saga_commit")?;
                saga.transition(SagaState::Committed, self.persistence.as_ref())
            })
            .map_err(|e| {
                log_op_error!(
                    "saga_commit",
                    e.clone(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    saga_id = saga.id().as_str()
                );
                e
            })?;

        log_op_end!(
            "saga_commit",
            duration_ms = start.elapsed().as_millis() as u64,
            saga_id = saga.id().as_str(),
            units = saga.log().len()
        );
        Ok(())
    }

    /// Abort the saga and revert everything it committed
    ///
    /// Runs detached like [`Self::execute`]: dropping this future leaves the
    /// compensation running until the saga is COMPENSATED or
    /// COMPENSATION_FAILED.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless the saga is ACTIVE.
    pub async fn rollback(&self, saga: &mut SagaTransaction) -> Result<RollbackOutcome> {
        let gate = saga.acquire().await;
        let this = self.clone();
        let driver = saga.share();
        detached("saga_rollback", gate, async move {
            driver.require(SagaState::Active, "saga_rollback")?;
            this.compensate(&driver).await
        })
        .await
    }

    async fn compensate(&self, saga: &SagaTransaction) -> Result<RollbackOutcome> {
        let log = saga.log();
        log_op_start!(
            "saga_compensate",
            saga_id = saga.id().as_str(),
            units = log.len()
        );
        let start = Instant::now();
        saga.transition(SagaState::Compensating, self.persistence.as_ref())?;

        let result = compensate(
            &log,
            &self.connections,
            &self.executor,
            self.persistence.as_ref(),
            RetryPolicy::compensation(&self.config),
        )
        .await;

        match result {
            Ok(reverted) => {
                saga.transition(SagaState::Compensated, self.persistence.as_ref())?;
                log_op_end!(
                    "saga_compensate",
                    duration_ms = start.elapsed().as_millis() as u64,
                    saga_id = saga.id().as_str(),
                    reverted = reverted
                );
                Ok(RollbackOutcome::Compensated { reverted })
            }
            Err(error) => {
                saga.transition(SagaState::CompensationFailed, self.persistence.as_ref())?;
                log_op_error!(
                    "saga_compensate",
                    error.clone(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    saga_id = saga.id().as_str()
                );
                Ok(RollbackOutcome::CompensationFailed { error })
            }
        }
    }
}

/// Run `work` on its own task while holding the saga's gate
async fn detached<T, F>(op: &str, gate: OwnedMutexGuard<()>, work: F) -> Result<T>
where
    T: Send + 'static,
    F: Future<Output = Result<T>> + Send + 'static,
{
    let handle = tokio::spawn(async move {
        let _gate = gate;
        work.await
    });
    handle.await.map_err(|e| {
        ExError::new(ExErrorKind::Internal)
            .with_op(op)
            .with_message(format!("saga task failed: {}", e))
    })?
}
