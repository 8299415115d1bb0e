//! Shard connection seam
//!
//! The coordinator talks to every data source through this trait. A
//! connection is owned by one route unit at a time, so methods take
//! `&mut self`.

use crate::errors::Result;
use crate::model::SqlValue;
use crate::snapshot::RowImage;
use async_trait::async_trait;

/// What a mutating statement reported back
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForwardOutcome {
    pub affected_rows: u64,
    /// Keys assigned by the database to inserted rows, in row order
    pub generated_keys: Vec<SqlValue>,
}

impl ForwardOutcome {
    pub fn new(affected_rows: u64) -> Self {
        Self {
            affected_rows,
            generated_keys: Vec::new(),
        }
    }

    pub fn with_generated_keys(mut self, keys: Vec<SqlValue>) -> Self {
        self.generated_keys = keys;
        self
    }
}

/// Connection-scoped query and statement execution on one data source
///
/// Implementations report driver failures as `ExErrorKind::Database`; the
/// caller re-classifies them by phase (snapshot, forward, compensation).
#[async_trait]
pub trait ShardConnection: Send {
    /// Start a local transaction
    async fn begin(&mut self) -> Result<()>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;

    /// Run a query; column labels in the returned rows are lower-cased
    async fn query(&mut self, sql: &str, parameters: &[SqlValue]) -> Result<Vec<RowImage>>;

    /// Run a mutating statement
    async fn execute(&mut self, sql: &str, parameters: &[SqlValue]) -> Result<ForwardOutcome>;
}
