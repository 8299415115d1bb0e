//! INSERT is reverted by a DELETE keyed on the inserted primary key values

use crate::connection::ForwardOutcome;
use crate::errors::{Result, SagaError};
use crate::model::{InsertStatement, SqlValue, ValueExpr};
use crate::revert::RevertSqlUnit;
use crate::sql_builder::GenericSqlBuilder;

/// Where one primary key value of an inserted row comes from
#[derive(Debug, Clone, PartialEq)]
pub enum KeySource {
    /// Known before execution (bound parameter or literal)
    Value(SqlValue),
    /// Assigned by the database; bound after the forward insert ran
    Generated,
}

/// Resolved facts of the forward INSERT needed to invert it
#[derive(Debug, Clone, PartialEq)]
pub struct InsertRevertContext {
    pub actual_table: String,
    pub primary_key_columns: Vec<String>,
    /// One entry per inserted row routed to this unit, one source per key column
    pub rows: Vec<Vec<KeySource>>,
    /// Keys the router attached to the route unit, used when the forward
    /// outcome reports none
    pub route_generated_keys: Vec<SqlValue>,
}

impl InsertRevertContext {
    /// Collect the primary key sources of every row routed to
    /// `(data_source, actual_table)`
    ///
    /// # Errors
    ///
    /// `MissingPrimaryKeyValue` when a key column is neither listed in the
    /// insert nor the generated key column; `ParameterIndexOutOfRange` and
    /// `UnsupportedAssignmentExpression` when a listed key value cannot be
    /// resolved.
    pub fn new(
        data_source: &str,
        actual_table: &str,
        primary_key_columns: Vec<String>,
        statement: &InsertStatement,
        route_generated_keys: Vec<SqlValue>,
    ) -> Result<Self> {
        let rows = statement
            .values
            .iter()
            .filter(|value| {
                value
                    .data_nodes
                    .iter()
                    .any(|node| node.matches(data_source, actual_table))
            })
            .map(|value| {
                primary_key_columns
                    .iter()
                    .map(|pk| key_source(statement, pk, &value.expressions, &value.parameters))
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            actual_table: actual_table.to_string(),
            primary_key_columns,
            rows,
            route_generated_keys,
        })
    }
}

fn key_source(
    statement: &InsertStatement,
    pk: &str,
    expressions: &[ValueExpr],
    parameters: &[SqlValue],
) -> Result<KeySource> {
    let position = statement
        .columns
        .iter()
        .position(|c| c.eq_ignore_ascii_case(pk));
    match position.and_then(|i| expressions.get(i)) {
        Some(ValueExpr::GeneratedKey) => Ok(KeySource::Generated),
        Some(expr) => Ok(KeySource::Value(expr.resolve(pk, parameters)?)),
        None => {
            let generated = statement
                .generated_key_column
                .as_deref()
                .is_some_and(|c| c.eq_ignore_ascii_case(pk));
            if generated {
                Ok(KeySource::Generated)
            } else {
                Err(SagaError::MissingPrimaryKeyValue {
                    table: statement.table.clone(),
                    column: pk.to_string(),
                }
                .into())
            }
        }
    }
}

/// Builds `DELETE FROM <table> WHERE <pk1> = ? [AND <pk2> = ? ...]`
#[derive(Debug, Clone, PartialEq)]
pub struct InsertRevertSynthesizer {
    context: InsertRevertContext,
}

impl InsertRevertSynthesizer {
    pub fn new(context: InsertRevertContext) -> Self {
        Self { context }
    }

    /// # Errors
    ///
    /// `MissingGeneratedKey` when a row relies on a database-generated key and
    /// neither the forward outcome nor the route unit supplies one.
    pub fn generate_revert_sql(&self, outcome: &ForwardOutcome) -> Result<Option<RevertSqlUnit>> {
        if self.context.rows.is_empty() || outcome.affected_rows == 0 {
            return Ok(None);
        }
        let generated_keys = if outcome.generated_keys.is_empty() {
            &self.context.route_generated_keys
        } else {
            &outcome.generated_keys
        };

        let sql = GenericSqlBuilder::new()
            .append_literals("DELETE FROM")
            .append_literals(&self.context.actual_table)
            .append_where_condition(&self.context.primary_key_columns)
            .to_sql();

        let mut unit = RevertSqlUnit::new(sql);
        for (row_index, row) in self.context.rows.iter().enumerate() {
            let tuple = row
                .iter()
                .map(|source| match source {
                    KeySource::Value(value) => Ok(value.clone()),
                    KeySource::Generated => self.generated_key(generated_keys, row_index),
                })
                .collect::<Result<Vec<_>>>()?;
            unit.parameters.push(tuple);
        }
        Ok(Some(unit))
    }

    fn generated_key(&self, keys: &[SqlValue], row: usize) -> Result<SqlValue> {
        keys.get(row).cloned().ok_or_else(|| {
            SagaError::MissingGeneratedKey {
                table: self.context.actual_table.clone(),
                row,
            }
            .into()
        })
    }
}
