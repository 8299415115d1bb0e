//! DELETE is reverted by re-inserting the captured rows

use crate::revert::RevertSqlUnit;
use crate::snapshot::Snapshot;
use crate::sql_builder::GenericSqlBuilder;

/// Builds `INSERT INTO <table> VALUES (?,...)` from the deleted rows
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteRevertSynthesizer {
    actual_table: String,
    snapshot: Snapshot,
}

impl DeleteRevertSynthesizer {
    pub fn new(actual_table: impl Into<String>, snapshot: Snapshot) -> Self {
        Self {
            actual_table: actual_table.into(),
            snapshot,
        }
    }

    pub fn generate_revert_sql(&self) -> Option<RevertSqlUnit> {
        let first = self.snapshot.rows().first()?;
        let sql = GenericSqlBuilder::new()
            .append_literals("INSERT INTO")
            .append_literals(&self.actual_table)
            .append_literals("VALUES")
            .append_placeholders(first.len())
            .to_sql();

        let mut unit = RevertSqlUnit::new(sql);
        unit.parameters = self
            .snapshot
            .rows()
            .iter()
            .map(|row| row.values().cloned().collect())
            .collect();
        Some(unit)
    }
}
