//! UPDATE is reverted by an UPDATE restoring the captured values

use crate::errors::Result;
use crate::model::{Assignment, SqlValue};
use crate::revert::RevertSqlUnit;
use crate::snapshot::{RowImage, Snapshot};
use crate::sql_builder::GenericSqlBuilder;

/// Resolved facts of the forward UPDATE needed to invert it
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRevertContext {
    pub actual_table: String,
    pub primary_key_columns: Vec<String>,
    /// Assigned columns with the values the forward statement writes
    pub assignments: Vec<(String, SqlValue)>,
}

impl UpdateRevertContext {
    /// Resolve every assignment against the unit's bound parameters
    ///
    /// # Errors
    ///
    /// `UnsupportedAssignmentExpression` for assignments that are not a
    /// parameter, text or number; `ParameterIndexOutOfRange` for bad markers.
    pub fn new(
        actual_table: impl Into<String>,
        primary_key_columns: Vec<String>,
        assignments: &[Assignment],
        bound_parameters: &[SqlValue],
    ) -> Result<Self> {
        let assignments = assignments
            .iter()
            .map(|a| Ok((a.column.clone(), a.value.resolve(&a.column, bound_parameters)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            actual_table: actual_table.into(),
            primary_key_columns,
            assignments,
        })
    }

    /// Columns the before-image must contain: primary key, then assigned
    /// columns not already listed
    pub fn snapshot_columns(&self) -> Vec<String> {
        let mut columns = self.primary_key_columns.clone();
        for (column, _) in &self.assignments {
            if !columns.iter().any(|c| c.eq_ignore_ascii_case(column)) {
                columns.push(column.clone());
            }
        }
        columns
    }

    fn assigned_value(&self, column: &str) -> Option<&SqlValue> {
        self.assignments
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|(_, value)| value)
    }
}

/// Builds `UPDATE <table> SET <assigned> = ? ... WHERE <pk> = ? ...`
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRevertSynthesizer {
    context: UpdateRevertContext,
    snapshot: Snapshot,
}

impl UpdateRevertSynthesizer {
    pub fn new(context: UpdateRevertContext, snapshot: Snapshot) -> Self {
        Self { context, snapshot }
    }

    pub fn generate_revert_sql(&self) -> Option<RevertSqlUnit> {
        if self.snapshot.is_empty() {
            return None;
        }
        let sql = GenericSqlBuilder::new()
            .append_literals("UPDATE")
            .append_literals(&self.context.actual_table)
            .append_update_set_assignments(self.context.assignments.iter().map(|(c, _)| c))
            .append_where_condition(&self.context.primary_key_columns)
            .to_sql();

        let mut unit = RevertSqlUnit::new(sql);
        unit.parameters = self
            .snapshot
            .rows()
            .iter()
            .map(|row| self.row_parameters(row))
            .collect();
        Some(unit)
    }

    fn row_parameters(&self, row: &RowImage) -> Vec<SqlValue> {
        let set_values = self
            .context
            .assignments
            .iter()
            .map(|(column, _)| row.get(column).cloned().unwrap_or(SqlValue::Null));
        // After the forward update a reassigned key column holds the new value
        let key_values = self.context.primary_key_columns.iter().map(|column| {
            self.context
                .assigned_value(column)
                .or_else(|| row.get(column))
                .cloned()
                .unwrap_or(SqlValue::Null)
        });
        set_values.chain(key_values).collect()
    }
}
