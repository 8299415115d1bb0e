//! Revert engine factory
//!
//! Resolves the route unit's actual table and the table's primary key, then
//! dispatches on statement kind. Every structural failure surfaces here,
//! before any connection is touched.

use crate::errors::{ExError, Result, SagaError};
use crate::model::{LogicSqlTransaction, RouteResult, RouteUnit, SqlStatement};
use crate::revert::{InsertRevertContext, RevertPlan, UpdateRevertContext};
use crate::snapshot::{SnapshotAccessor, SnapshotColumns};

pub struct RevertEngineFactory;

impl RevertEngineFactory {
    /// Build the revert plan for one route unit of a logical statement
    ///
    /// # Errors
    ///
    /// - `UnsupportedStatement` for anything but INSERT, UPDATE and DELETE
    /// - `RouteResolutionFailure` when the unit's data source or actual table
    ///   is missing from the route result
    /// - `MissingPrimaryKey` when the table declares no primary key
    /// - `MissingPrimaryKeyValue`, `UnsupportedAssignmentExpression` or
    ///   `ParameterIndexOutOfRange` when statement values cannot be bound
    pub fn new_plan(transaction: &LogicSqlTransaction, unit: &RouteUnit) -> Result<RevertPlan> {
        let logic_table = match transaction.statement.table() {
            Some(table) => table,
            None => {
                return Err(SagaError::UnsupportedStatement {
                    kind: transaction.statement.kind().to_string(),
                }
                .into())
            }
        };
        let actual_table =
            resolve_actual_table(&transaction.route_result, &unit.data_source_name, logic_table)?;
        let primary_key_columns = transaction.table_metadata.primary_key_columns();
        if primary_key_columns.is_empty() {
            return Err(SagaError::MissingPrimaryKey {
                table: logic_table.to_string(),
            }
            .into());
        }

        let with_unit = |e: ExError| {
            e.with_data_source(unit.data_source_name.clone())
                .with_table(actual_table.clone())
        };

        let plan = match &transaction.statement {
            SqlStatement::Insert(statement) => RevertPlan::Insert(
                InsertRevertContext::new(
                    &unit.data_source_name,
                    &actual_table,
                    primary_key_columns,
                    statement,
                    unit.generated_keys.clone(),
                )
                .map_err(with_unit)?,
            ),
            SqlStatement::Update(statement) => {
                let context = UpdateRevertContext::new(
                    actual_table.clone(),
                    primary_key_columns,
                    &statement.assignments,
                    unit.parameters(),
                )
                .map_err(with_unit)?;
                let accessor = SnapshotAccessor::new(
                    &actual_table,
                    statement.alias.as_deref(),
                    SnapshotColumns::Named(context.snapshot_columns()),
                    &statement.predicate,
                    unit.parameters(),
                )
                .map_err(with_unit)?;
                RevertPlan::Update { accessor, context }
            }
            SqlStatement::Delete(statement) => {
                let accessor = SnapshotAccessor::new(
                    &actual_table,
                    statement.alias.as_deref(),
                    SnapshotColumns::All,
                    &statement.predicate,
                    unit.parameters(),
                )
                .map_err(with_unit)?;
                RevertPlan::Delete {
                    accessor,
                    actual_table,
                }
            }
            SqlStatement::Other { kind } => {
                return Err(SagaError::UnsupportedStatement { kind: kind.clone() }.into())
            }
        };
        Ok(plan)
    }
}

/// Actual table of `logic_table` on `data_source`, matched case-insensitively
fn resolve_actual_table(
    route_result: &RouteResult,
    data_source: &str,
    logic_table: &str,
) -> Result<String> {
    let table_unit = route_result
        .table_units
        .iter()
        .find(|t| t.data_source_name.eq_ignore_ascii_case(data_source))
        .ok_or_else(|| SagaError::DataSourceNotRouted {
            data_source: data_source.to_string(),
        })?;
    table_unit
        .routing_tables
        .iter()
        .find(|r| r.logic_table_name.eq_ignore_ascii_case(logic_table))
        .map(|r| r.actual_table_name.clone())
        .ok_or_else(|| {
            SagaError::ActualTableNotRouted {
                data_source: data_source.to_string(),
                logic_table: logic_table.to_string(),
            }
            .into()
        })
}
