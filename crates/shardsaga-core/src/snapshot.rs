//! Before-image capture
//!
//! Before a forward UPDATE or DELETE runs, the rows it is about to touch are
//! read on the same connection and inside the same local transaction, using
//! the statement's own filter. The resulting [`Snapshot`] is what makes the
//! revert statement a valid inverse.

use crate::connection::ShardConnection;
use crate::errors::{ExError, ExErrorKind, Result};
use crate::model::{Predicate, SqlValue, ValueExpr};
use crate::sql_builder::GenericSqlBuilder;
use shardsaga_core_types::Sensitive;

/// One captured row: ordered `(lower-cased column, value)` pairs
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RowImage {
    values: Vec<(String, SqlValue)>,
}

impl RowImage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column; the label is lower-cased
    pub fn push(&mut self, column: impl AsRef<str>, value: SqlValue) {
        self.values.push((column.as_ref().to_lowercase(), value));
    }

    pub fn with(mut self, column: impl AsRef<str>, value: impl Into<SqlValue>) -> Self {
        self.push(column, value.into());
        self
    }

    /// Case-insensitive lookup
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.values
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|(_, value)| value)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(name, _)| name.as_str())
    }

    /// Values in captured column order
    pub fn values(&self) -> impl Iterator<Item = &SqlValue> {
        self.values.iter().map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Ordered before-image of the rows one forward statement affects
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    rows: Vec<RowImage>,
}

impl Snapshot {
    pub fn new(rows: Vec<RowImage>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[RowImage] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

/// Columns the snapshot reads
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotColumns {
    /// Whole row, in table column order
    All,
    Named(Vec<String>),
}

/// Read query capturing a before-image for one route unit
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotAccessor {
    sql: String,
    parameters: Vec<SqlValue>,
    table: String,
}

impl SnapshotAccessor {
    /// Build `SELECT <columns> FROM <table> [alias] <filter>`
    ///
    /// The filter is the forward statement's own predicate evaluated against
    /// the unit's bound parameters, so the query selects exactly the rows the
    /// forward statement will touch.
    ///
    /// # Errors
    ///
    /// `ParameterIndexOutOfRange` or `UnsupportedAssignmentExpression` when
    /// the predicate cannot be bound.
    pub fn new(
        actual_table: &str,
        alias: Option<&str>,
        columns: SnapshotColumns,
        predicate: &Predicate,
        bound_parameters: &[SqlValue],
    ) -> Result<Self> {
        let builder = GenericSqlBuilder::new().append_literals("SELECT");
        let builder = match &columns {
            SnapshotColumns::All => builder.append_literals("*"),
            SnapshotColumns::Named(names) => builder.append_columns(names),
        };
        let builder = builder
            .append_literals("FROM")
            .append_literals(actual_table)
            .append_literals(alias.unwrap_or_default());

        let (builder, parameters) = match predicate {
            Predicate::Conditions(conditions) => {
                let parameters = conditions
                    .iter()
                    .map(|c| c.value.resolve(&c.column, bound_parameters))
                    .collect::<Result<Vec<_>>>()?;
                let builder = builder.append_where_condition(conditions.iter().map(|c| &c.column));
                (builder, parameters)
            }
            Predicate::Raw {
                sql,
                parameter_indexes,
            } => {
                let parameters = parameter_indexes
                    .iter()
                    .map(|index| ValueExpr::Parameter(*index).resolve("", bound_parameters))
                    .collect::<Result<Vec<_>>>()?;
                (builder.append_literals(sql), parameters)
            }
        };

        Ok(Self {
            sql: builder.to_sql(),
            parameters,
            table: actual_table.to_string(),
        })
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn parameters(&self) -> &[SqlValue] {
        &self.parameters
    }

    /// Run the snapshot query on the forward statement's connection
    ///
    /// Must be called inside the local transaction that will run the forward
    /// statement. Failures are reported as `SnapshotQueryFailure` and are not
    /// retried here.
    ///
    /// # Errors
    ///
    /// `SnapshotQueryFailure` wrapping the connection's error.
    pub async fn capture(&self, conn: &mut dyn ShardConnection) -> Result<Snapshot> {
        tracing::debug!(
            op = "snapshot_capture",
            actual_table = %self.table,
            sql = %self.sql,
            parameters = ?Sensitive::new(&self.parameters),
        );
        let rows = conn
            .query(&self.sql, &self.parameters)
            .await
            .map_err(|e| {
                ExError::wrap(ExErrorKind::SnapshotQueryFailure, e)
                    .with_op("snapshot_capture")
                    .with_table(self.table.clone())
            })?;
        Ok(Snapshot::new(rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Condition;

    #[test]
    fn test_row_image_lowercases_and_looks_up_case_insensitively() {
        let row = RowImage::new().with("Order_ID", 1).with("STATUS", "init");
        assert_eq!(row.columns().collect::<Vec<_>>(), vec!["order_id", "status"]);
        assert_eq!(row.get("order_id"), Some(&SqlValue::Integer(1)));
        assert_eq!(row.get("Status"), Some(&SqlValue::Text("init".into())));
        assert_eq!(row.get("user_id"), None);
    }

    #[test]
    fn test_accessor_with_conditions() {
        let predicate = Predicate::Conditions(vec![
            Condition::new("user_id", ValueExpr::Parameter(1)),
            Condition::new("status", ValueExpr::Text("init".into())),
        ]);
        let accessor = SnapshotAccessor::new(
            "t_order_0",
            None,
            SnapshotColumns::Named(vec!["order_id".into(), "status".into()]),
            &predicate,
            &[SqlValue::from("done"), SqlValue::from(10)],
        )
        .unwrap();

        assert_eq!(
            accessor.sql(),
            "SELECT order_id, status FROM t_order_0 WHERE user_id = ? AND status = ?"
        );
        assert_eq!(
            accessor.parameters(),
            &[SqlValue::Integer(10), SqlValue::Text("init".into())]
        );
    }

    #[test]
    fn test_accessor_with_raw_where_and_alias() {
        let predicate = Predicate::Raw {
            sql: "WHERE o.order_id IN (?, ?)".into(),
            parameter_indexes: vec![1, 2],
        };
        let accessor = SnapshotAccessor::new(
            "t_order_1",
            Some("o"),
            SnapshotColumns::All,
            &predicate,
            &[SqlValue::from("done"), SqlValue::from(1), SqlValue::from(2)],
        )
        .unwrap();

        assert_eq!(
            accessor.sql(),
            "SELECT * FROM t_order_1 o WHERE o.order_id IN (?, ?)"
        );
        assert_eq!(
            accessor.parameters(),
            &[SqlValue::Integer(1), SqlValue::Integer(2)]
        );
    }

    #[test]
    fn test_accessor_without_filter_selects_everything() {
        let accessor = SnapshotAccessor::new(
            "t_order_0",
            None,
            SnapshotColumns::All,
            &Predicate::Conditions(vec![]),
            &[],
        )
        .unwrap();
        assert_eq!(accessor.sql(), "SELECT * FROM t_order_0");
        assert!(accessor.parameters().is_empty());
    }

    #[test]
    fn test_accessor_rejects_unbound_marker() {
        let predicate = Predicate::Raw {
            sql: "WHERE order_id = ?".into(),
            parameter_indexes: vec![4],
        };
        let err =
            SnapshotAccessor::new("t", None, SnapshotColumns::All, &predicate, &[]).unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::ParameterIndexOutOfRange);
    }
}
