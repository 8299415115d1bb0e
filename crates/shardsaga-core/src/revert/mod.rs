//! Revert SQL synthesis
//!
//! For every shard-local forward execution the engine produces a
//! [`RevertSqlUnit`]: one compensating SQL text plus one parameter tuple per
//! affected row.
//!
//! The work is split in three steps so that nothing un-revertible is ever
//! executed:
//! 1. [`RevertEngineFactory::new_plan`] performs every structural check
//!    (statement kind, actual table, primary key, assignment values) without
//!    touching a connection.
//! 2. [`RevertPlan::capture`] reads the before-image (UPDATE/DELETE) inside
//!    the forward statement's local transaction.
//! 3. [`RevertSynthesizer::generate_revert_sql`] runs after the forward
//!    statement, when generated keys are known.

pub mod delete;
pub mod engine;
pub mod insert;
pub mod update;

pub use delete::DeleteRevertSynthesizer;
pub use engine::RevertEngineFactory;
pub use insert::{InsertRevertContext, InsertRevertSynthesizer, KeySource};
pub use update::{UpdateRevertContext, UpdateRevertSynthesizer};

use crate::connection::{ForwardOutcome, ShardConnection};
use crate::errors::Result;
use crate::model::SqlValue;
use crate::snapshot::SnapshotAccessor;
use serde::{Deserialize, Serialize};

/// Compensating SQL for one route unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevertSqlUnit {
    pub sql: String,
    /// One tuple per affected row, in snapshot order
    pub parameters: Vec<Vec<SqlValue>>,
}

impl RevertSqlUnit {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            parameters: Vec::new(),
        }
    }
}

/// Structurally validated revert recipe for one route unit
#[derive(Debug, Clone, PartialEq)]
pub enum RevertPlan {
    Insert(InsertRevertContext),
    Update {
        accessor: SnapshotAccessor,
        context: UpdateRevertContext,
    },
    Delete {
        accessor: SnapshotAccessor,
        actual_table: String,
    },
}

impl RevertPlan {
    /// The before-image query, if this kind needs one
    pub fn snapshot_accessor(&self) -> Option<&SnapshotAccessor> {
        match self {
            RevertPlan::Insert(_) => None,
            RevertPlan::Update { accessor, .. } | RevertPlan::Delete { accessor, .. } => {
                Some(accessor)
            }
        }
    }

    pub fn actual_table(&self) -> &str {
        match self {
            RevertPlan::Insert(context) => &context.actual_table,
            RevertPlan::Update { context, .. } => &context.actual_table,
            RevertPlan::Delete { actual_table, .. } => actual_table,
        }
    }

    /// Capture the before-image and produce the synthesizer
    ///
    /// Call inside the local transaction that will run the forward
    /// statement, before running it.
    ///
    /// # Errors
    ///
    /// `SnapshotQueryFailure` if the before-image query fails.
    pub async fn capture(&self, conn: &mut dyn ShardConnection) -> Result<RevertSynthesizer> {
        match self {
            RevertPlan::Insert(context) => Ok(RevertSynthesizer::Insert(
                InsertRevertSynthesizer::new(context.clone()),
            )),
            RevertPlan::Update { accessor, context } => {
                let snapshot = accessor.capture(conn).await?;
                Ok(RevertSynthesizer::Update(UpdateRevertSynthesizer::new(
                    context.clone(),
                    snapshot,
                )))
            }
            RevertPlan::Delete {
                accessor,
                actual_table,
            } => {
                let snapshot = accessor.capture(conn).await?;
                Ok(RevertSynthesizer::Delete(DeleteRevertSynthesizer::new(
                    actual_table.clone(),
                    snapshot,
                )))
            }
        }
    }
}

/// Revert generator holding everything captured before the forward statement
#[derive(Debug, Clone, PartialEq)]
pub enum RevertSynthesizer {
    Insert(InsertRevertSynthesizer),
    Update(UpdateRevertSynthesizer),
    Delete(DeleteRevertSynthesizer),
}

impl RevertSynthesizer {
    /// Produce the revert unit, or `None` when the forward statement affected
    /// no rows
    ///
    /// Pure: repeated calls with the same outcome yield identical units.
    ///
    /// # Errors
    ///
    /// Insert reverts fail with `MissingGeneratedKey` when the forward
    /// outcome lacks a key the revert needs.
    pub fn generate_revert_sql(&self, outcome: &ForwardOutcome) -> Result<Option<RevertSqlUnit>> {
        match self {
            RevertSynthesizer::Insert(s) => s.generate_revert_sql(outcome),
            RevertSynthesizer::Update(s) => Ok(s.generate_revert_sql()),
            RevertSynthesizer::Delete(s) => Ok(s.generate_revert_sql()),
        }
    }
}
