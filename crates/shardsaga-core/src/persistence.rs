//! Saga persistence hook
//!
//! The coordinator reports every state change, every completed forward unit
//! and every compensation attempt through [`SagaPersistence`]. Hook failures
//! are logged by the caller and never change saga flow.

use crate::errors::{ExError, ExErrorKind, Result};
use crate::revert::RevertSqlUnit;
use serde::{Deserialize, Serialize};
use shardsaga_core_types::SagaId;
use std::str::FromStr;

/// Lifecycle state of one saga
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SagaState {
    Active,
    Executing,
    Committed,
    /// Forward recovery exhausted its retries
    Failed,
    Compensating,
    Compensated,
    CompensationFailed,
}

impl SagaState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaState::Active => "ACTIVE",
            SagaState::Executing => "EXECUTING",
            SagaState::Committed => "COMMITTED",
            SagaState::Failed => "FAILED",
            SagaState::Compensating => "COMPENSATING",
            SagaState::Compensated => "COMPENSATED",
            SagaState::CompensationFailed => "COMPENSATION_FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SagaState::Committed
                | SagaState::Failed
                | SagaState::Compensated
                | SagaState::CompensationFailed
        )
    }

    pub fn can_transition_to(&self, next: SagaState) -> bool {
        use SagaState::*;
        matches!(
            (self, next),
            (Active, Executing)
                | (Active, Committed)
                | (Active, Compensating)
                | (Executing, Active)
                | (Executing, Failed)
                | (Executing, Compensating)
                | (Compensating, Compensated)
                | (Compensating, CompensationFailed)
        )
    }
}

impl std::fmt::Display for SagaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SagaState {
    type Err = ExError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ACTIVE" => Ok(SagaState::Active),
            "EXECUTING" => Ok(SagaState::Executing),
            "COMMITTED" => Ok(SagaState::Committed),
            "FAILED" => Ok(SagaState::Failed),
            "COMPENSATING" => Ok(SagaState::Compensating),
            "COMPENSATED" => Ok(SagaState::Compensated),
            "COMPENSATION_FAILED" => Ok(SagaState::CompensationFailed),
            other => Err(ExError::new(ExErrorKind::Serialization)
                .with_message(format!("Unknown saga state: {}", other))),
        }
    }
}

/// A forward unit that committed locally
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub saga_id: SagaId,
    /// Completion order within the saga, starting at 0
    pub sequence: u64,
    pub statement_index: usize,
    pub unit_index: usize,
    pub data_source: String,
    pub actual_table: String,
    pub affected_rows: u64,
    /// `None` when the forward statement changed nothing
    pub revert: Option<RevertSqlUnit>,
}

/// One try at running a record's revert unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompensationAttempt {
    pub saga_id: SagaId,
    pub sequence: u64,
    /// 1-based
    pub attempt: u32,
    pub succeeded: bool,
    pub error: Option<String>,
}

/// Durable record of saga progress
#[allow(clippy::result_large_err)]
pub trait SagaPersistence: Send + Sync {
    /// # Errors
    ///
    /// Returns `ExErrorKind::Persistence` if the change cannot be recorded.
    fn saga_state_changed(&self, saga_id: &SagaId, state: SagaState) -> Result<()>;

    /// # Errors
    ///
    /// Returns `ExErrorKind::Persistence` or `ExErrorKind::Serialization`.
    fn forward_succeeded(&self, record: &ExecutionRecord) -> Result<()>;

    /// # Errors
    ///
    /// Returns `ExErrorKind::Persistence` if the attempt cannot be recorded.
    fn compensation_attempted(&self, attempt: &CompensationAttempt) -> Result<()>;
}

/// Keeps nothing. Used when persistence is disabled.
pub struct NoopSagaPersistence;

impl SagaPersistence for NoopSagaPersistence {
    fn saga_state_changed(&self, _: &SagaId, _: SagaState) -> Result<()> {
        Ok(())
    }

    fn forward_succeeded(&self, _: &ExecutionRecord) -> Result<()> {
        Ok(())
    }

    fn compensation_attempted(&self, _: &CompensationAttempt) -> Result<()> {
        Ok(())
    }
}
