//! shardsaga core - revert SQL synthesis for saga compensation
//!
//! This crate holds everything needed to turn one shard-local DML execution
//! into a compensating ("revert") statement:
//! - Data model for routed statements, table metadata and row images
//! - Generic SQL builder
//! - Snapshot accessor capturing before-images on the forward connection
//! - Insert/Update/Delete revert synthesizers and the factory dispatching to them
//! - Error facility, logging facility and saga configuration
//! - Connection and persistence seams implemented by outer crates

pub mod config;
pub mod connection;
pub mod errors;
pub mod logging_facility;
pub mod model;
pub mod persistence;
pub mod revert;
pub mod snapshot;
pub mod sql_builder;

// Re-export commonly used types
pub use config::{RecoveryPolicy, SagaConfig};
pub use connection::{ForwardOutcome, ShardConnection};
pub use errors::{ExError, ExErrorKind, Result, SagaError};
pub use model::{LogicSqlTransaction, RouteUnit, SqlStatement, SqlValue};
pub use persistence::{
    CompensationAttempt, ExecutionRecord, NoopSagaPersistence, SagaPersistence, SagaState,
};
pub use revert::{RevertEngineFactory, RevertPlan, RevertSqlUnit, RevertSynthesizer};
pub use snapshot::{RowImage, Snapshot, SnapshotAccessor};
