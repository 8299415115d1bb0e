//! Saga transaction state
//!
//! A saga's state, accepted statements and execution log sit behind one
//! short-lived lock so the task driving a statement or a compensation can
//! keep updating them after the caller's future is dropped. A second, async
//! gate admits one such task at a time: whatever runs next on the saga waits
//! for the task in flight to finish.

use crate::log::ExecutionLog;
use shardsaga_core::errors::{ExError, ExErrorKind, Result};
use shardsaga_core::model::LogicSqlTransaction;
use shardsaga_core::{ExecutionRecord, SagaPersistence, SagaState};
use shardsaga_core_types::schema::EVENT_TRANSITION;
use shardsaga_core_types::SagaId;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::OwnedMutexGuard;

#[derive(Debug)]
struct SagaCore {
    state: SagaState,
    statements: Vec<LogicSqlTransaction>,
    log: ExecutionLog,
}

/// One distributed transaction spanning any number of logical statements
#[derive(Debug)]
pub struct SagaTransaction {
    id: SagaId,
    core: Arc<Mutex<SagaCore>>,
    gate: Arc<tokio::sync::Mutex<()>>,
}

impl SagaTransaction {
    pub(crate) fn new() -> Self {
        Self {
            id: SagaId::new(),
            core: Arc::new(Mutex::new(SagaCore {
                state: SagaState::Active,
                statements: Vec::new(),
                log: ExecutionLog::new(),
            })),
            gate: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Second handle onto the same saga, for the task driving it
    pub(crate) fn share(&self) -> Self {
        Self {
            id: self.id.clone(),
            core: Arc::clone(&self.core),
            gate: Arc::clone(&self.gate),
        }
    }

    fn core(&self) -> MutexGuard<'_, SagaCore> {
        // Every critical section leaves the core consistent
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> &SagaId {
        &self.id
    }

    pub fn state(&self) -> SagaState {
        self.core().state
    }

    /// Copy of the forward units committed so far, in completion order
    pub fn log(&self) -> ExecutionLog {
        self.core().log.clone()
    }

    /// Statements accepted so far, in submission order
    pub fn statements(&self) -> Vec<LogicSqlTransaction> {
        self.core().statements.clone()
    }

    pub fn statement_count(&self) -> usize {
        self.core().statements.len()
    }

    /// Wait for any statement or compensation still running on this saga,
    /// including one whose caller gave up on it, and return the state it
    /// left behind
    pub async fn wait_idle(&self) -> SagaState {
        let _gate = self.gate.lock().await;
        self.state()
    }

    /// Wait for exclusive use of the saga
    pub(crate) async fn acquire(&self) -> OwnedMutexGuard<()> {
        Arc::clone(&self.gate).lock_owned().await
    }

    /// Exclusive use of the saga, if nothing is running on it
    pub(crate) fn try_acquire(&self, op: &str) -> Result<OwnedMutexGuard<()>> {
        Arc::clone(&self.gate).try_lock_owned().map_err(|_| {
            ExError::new(ExErrorKind::InvalidState)
                .with_op(op)
                .with_message(format!("saga {} has an operation in flight", self.id))
        })
    }

    /// Record a statement that passed its structural checks; returns its index
    pub(crate) fn accept(&self, statement: LogicSqlTransaction) -> usize {
        let mut core = self.core();
        core.statements.push(statement);
        core.statements.len() - 1
    }

    /// Append the record `build` makes for the next sequence number
    pub(crate) fn append_with(
        &self,
        build: impl FnOnce(u64) -> ExecutionRecord,
    ) -> ExecutionRecord {
        let mut core = self.core();
        let record = build(core.log.next_sequence());
        core.log.append(record.clone());
        record
    }

    /// Fail with `InvalidState` unless the saga is in `expected`
    pub(crate) fn require(&self, expected: SagaState, op: &str) -> Result<()> {
        let state = self.state();
        if state == expected {
            return Ok(());
        }
        Err(ExError::new(ExErrorKind::InvalidState)
            .with_op(op)
            .with_message(format!("saga {} is {}, expected {}", self.id, state, expected)))
    }

    /// Move to `next` and report it to the persistence hook
    ///
    /// # Errors
    ///
    /// `InvalidState` for a transition the state machine does not allow.
    pub(crate) fn transition(
        &self,
        next: SagaState,
        persistence: &dyn SagaPersistence,
    ) -> Result<()> {
        let previous = {
            let mut core = self.core();
            if !core.state.can_transition_to(next) {
                return Err(ExError::new(ExErrorKind::InvalidState)
                    .with_op("saga_transition")
                    .with_message(format!(
                        "saga {} cannot move from {} to {}",
                        self.id, core.state, next
                    )));
            }
            std::mem::replace(&mut core.state, next)
        };
        tracing::info!(
            event = EVENT_TRANSITION,
            saga_id = %self.id,
            from_state = previous.as_str(),
            to_state = next.as_str(),
        );
        if let Err(e) = persistence.saga_state_changed(&self.id, next) {
            tracing::warn!(
                saga_id = %self.id,
                err_code = e.code(),
                error = %e,
                "saga state change not persisted"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shardsaga_core::model::{ColumnMetadata, RouteResult, SqlStatement, TableMetadata};
    use shardsaga_core::NoopSagaPersistence;

    fn statement(sql: &str) -> LogicSqlTransaction {
        LogicSqlTransaction::new(
            sql,
            SqlStatement::Other {
                kind: "SELECT".into(),
            },
            RouteResult::new(vec![], vec![]),
            TableMetadata::new("t_order", vec![ColumnMetadata::new("order_id", true)]),
        )
    }

    #[test]
    fn test_new_saga_is_active_and_empty() {
        let saga = SagaTransaction::new();
        assert_eq!(saga.state(), SagaState::Active);
        assert!(saga.log().is_empty());
        assert_eq!(saga.statement_count(), 0);
    }

    #[test]
    fn test_accepted_statements_keep_submission_order() {
        let saga = SagaTransaction::new();
        assert_eq!(saga.accept(statement("first")), 0);
        assert_eq!(saga.accept(statement("second")), 1);

        let sql: Vec<String> = saga.statements().into_iter().map(|s| s.sql).collect();
        assert_eq!(sql, vec!["first", "second"]);
    }

    #[test]
    fn test_shared_handle_sees_the_same_saga() {
        let saga = SagaTransaction::new();
        let driver = saga.share();
        driver.transition(SagaState::Executing, &NoopSagaPersistence).unwrap();
        assert_eq!(saga.state(), SagaState::Executing);
        assert_eq!(driver.id(), saga.id());
    }

    #[test]
    fn test_legal_round_trip_through_executing() {
        let saga = SagaTransaction::new();
        saga.transition(SagaState::Executing, &NoopSagaPersistence).unwrap();
        saga.transition(SagaState::Active, &NoopSagaPersistence).unwrap();
        assert_eq!(saga.state(), SagaState::Active);
    }

    #[test]
    fn test_illegal_transition_is_rejected() {
        let saga = SagaTransaction::new();
        let err = saga
            .transition(SagaState::Compensated, &NoopSagaPersistence)
            .unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::InvalidState);
        assert_eq!(saga.state(), SagaState::Active);
    }

    #[test]
    fn test_require_names_both_states() {
        let saga = SagaTransaction::new();
        let err = saga.require(SagaState::Executing, "saga_commit").unwrap_err();
        assert!(err.message().contains("ACTIVE"));
        assert!(err.message().contains("EXECUTING"));
    }

    #[tokio::test]
    async fn test_gate_admits_one_operation_at_a_time() {
        let saga = SagaTransaction::new();
        let held = saga.acquire().await;
        assert_eq!(
            saga.try_acquire("saga_commit").unwrap_err().kind(),
            ExErrorKind::InvalidState
        );
        drop(held);
        assert!(saga.try_acquire("saga_commit").is_ok());
        assert_eq!(saga.wait_idle().await, SagaState::Active);
    }
}
