// Integration tests for the revert engine factory and plan capture.
// Covers dispatch by statement kind, fail-fast structural checks and the
// plan -> capture -> generate pipeline over a recording connection.

use async_trait::async_trait;
use shardsaga_core::errors::{ExError, ExErrorKind, Result};
use shardsaga_core::model::{
    Assignment, ColumnMetadata, Condition, DataNode, DeleteStatement, InsertStatement,
    InsertValue, LogicSqlTransaction, Predicate, RouteResult, RouteUnit, SqlStatement, SqlValue,
    TableMetadata, TableUnit, UpdateStatement, ValueExpr,
};
use shardsaga_core::revert::{RevertEngineFactory, RevertPlan};
use shardsaga_core::{ForwardOutcome, RowImage, ShardConnection};

/// Answers every query with fixed rows and records what it was asked
struct RecordingConnection {
    rows: Vec<RowImage>,
    fail_queries: bool,
    queries: Vec<(String, Vec<SqlValue>)>,
}

impl RecordingConnection {
    fn new(rows: Vec<RowImage>) -> Self {
        Self {
            rows,
            fail_queries: false,
            queries: Vec::new(),
        }
    }
}

#[async_trait]
impl ShardConnection for RecordingConnection {
    async fn begin(&mut self) -> Result<()> {
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        Ok(())
    }

    async fn query(&mut self, sql: &str, parameters: &[SqlValue]) -> Result<Vec<RowImage>> {
        self.queries.push((sql.to_string(), parameters.to_vec()));
        if self.fail_queries {
            return Err(ExError::new(ExErrorKind::Database).with_message("database is locked"));
        }
        Ok(self.rows.clone())
    }

    async fn execute(&mut self, _: &str, _: &[SqlValue]) -> Result<ForwardOutcome> {
        Ok(ForwardOutcome::new(self.rows.len() as u64))
    }
}

fn order_metadata() -> TableMetadata {
    TableMetadata::new(
        "t_order",
        vec![
            ColumnMetadata::new("order_id", true),
            ColumnMetadata::new("user_id", false),
            ColumnMetadata::new("status", false),
        ],
    )
}

fn routed(
    statement: SqlStatement,
    unit: RouteUnit,
    metadata: TableMetadata,
) -> LogicSqlTransaction {
    let route_result = RouteResult::new(
        vec![unit],
        vec![TableUnit::new("ds_0").route("t_order", "t_order_0")],
    );
    LogicSqlTransaction::new("logic sql", statement, route_result, metadata)
}

fn update_status() -> (LogicSqlTransaction, RouteUnit) {
    let unit = RouteUnit::new(
        "ds_0",
        "UPDATE t_order_0 SET status = ? WHERE user_id = ?",
        vec![SqlValue::from("done"), SqlValue::from(1)],
    );
    let statement = SqlStatement::Update(UpdateStatement {
        table: "t_order".into(),
        alias: None,
        assignments: vec![Assignment::new("status", ValueExpr::Parameter(0))],
        predicate: Predicate::Conditions(vec![Condition::new("user_id", ValueExpr::Parameter(1))]),
    });
    (routed(statement, unit.clone(), order_metadata()), unit)
}

#[test]
fn test_select_is_rejected_as_unsupported() {
    let unit = RouteUnit::new("ds_0", "SELECT * FROM t_order_0", vec![]);
    let tx = routed(
        SqlStatement::Other {
            kind: "SELECT".into(),
        },
        unit.clone(),
        order_metadata(),
    );
    let err = RevertEngineFactory::new_plan(&tx, &unit).unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::UnsupportedStatement);
    assert!(err.message().contains("SELECT"));
}

#[test]
fn test_table_without_primary_key_is_rejected() {
    let (tx, unit) = update_status();
    let tx = LogicSqlTransaction {
        table_metadata: TableMetadata::new("t_order", vec![ColumnMetadata::new("status", false)]),
        ..tx
    };
    let err = RevertEngineFactory::new_plan(&tx, &unit).unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::MissingPrimaryKey);
}

#[test]
fn test_unrouted_data_source_is_rejected() {
    let (tx, _) = update_status();
    let stray = RouteUnit::new("ds_7", "UPDATE t_order_3 SET status = ?", vec![]);
    let err = RevertEngineFactory::new_plan(&tx, &stray).unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::RouteResolutionFailure);
}

#[test]
fn test_function_assignment_fails_before_any_query() {
    let (mut tx, unit) = update_status();
    if let SqlStatement::Update(update) = &mut tx.statement {
        update
            .assignments
            .push(Assignment::new("updated_at", ValueExpr::Expression("NOW()".into())));
    }
    let err = RevertEngineFactory::new_plan(&tx, &unit).unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::UnsupportedAssignmentExpression);
    assert_eq!(err.data_source(), Some("ds_0"));
}

#[test]
fn test_insert_plan_needs_no_snapshot() {
    let unit = RouteUnit::new(
        "ds_0",
        "INSERT INTO t_order_0 (order_id, user_id, status) VALUES (?, ?, ?)",
        vec![SqlValue::from(1), SqlValue::from(1), SqlValue::from("init")],
    );
    let statement = SqlStatement::Insert(InsertStatement {
        table: "t_order".into(),
        columns: vec!["order_id".into(), "user_id".into(), "status".into()],
        values: vec![InsertValue {
            expressions: vec![
                ValueExpr::Parameter(0),
                ValueExpr::Parameter(1),
                ValueExpr::Parameter(2),
            ],
            parameters: unit.parameters().to_vec(),
            data_nodes: vec![DataNode::new("ds_0", "t_order_0")],
        }],
        generated_key_column: None,
    });
    let tx = routed(statement, unit.clone(), order_metadata());

    let plan = RevertEngineFactory::new_plan(&tx, &unit).unwrap();
    assert!(matches!(plan, RevertPlan::Insert(_)));
    assert!(plan.snapshot_accessor().is_none());
}

#[tokio::test]
async fn test_update_pipeline_captures_then_restores() {
    let (tx, unit) = update_status();
    let plan = RevertEngineFactory::new_plan(&tx, &unit).unwrap();
    assert_eq!(
        plan.snapshot_accessor().unwrap().sql(),
        "SELECT order_id, status FROM t_order_0 WHERE user_id = ?"
    );

    let mut conn = RecordingConnection::new(vec![
        RowImage::new().with("order_id", 1).with("status", "init"),
        RowImage::new().with("order_id", 2).with("status", "init"),
    ]);
    let synthesizer = plan.capture(&mut conn).await.unwrap();
    assert_eq!(conn.queries.len(), 1);
    assert_eq!(conn.queries[0].1, vec![SqlValue::from(1)]);

    let unit = synthesizer
        .generate_revert_sql(&ForwardOutcome::new(2))
        .unwrap()
        .unwrap();
    assert_eq!(unit.sql, "UPDATE t_order_0 SET status = ? WHERE order_id = ?");
    assert_eq!(
        unit.parameters,
        vec![
            vec![SqlValue::from("init"), SqlValue::from(1)],
            vec![SqlValue::from("init"), SqlValue::from(2)],
        ]
    );
}

#[tokio::test]
async fn test_delete_pipeline_reinserts_full_rows() {
    let unit = RouteUnit::new(
        "ds_0",
        "DELETE FROM t_order_0 WHERE user_id = ?",
        vec![SqlValue::from(1)],
    );
    let statement = SqlStatement::Delete(DeleteStatement {
        table: "t_order".into(),
        alias: None,
        predicate: Predicate::Raw {
            sql: "WHERE user_id = ?".into(),
            parameter_indexes: vec![0],
        },
    });
    let tx = routed(statement, unit.clone(), order_metadata());
    let plan = RevertEngineFactory::new_plan(&tx, &unit).unwrap();

    let mut conn = RecordingConnection::new(vec![RowImage::new()
        .with("order_id", 5)
        .with("user_id", 1)
        .with("status", "init")]);
    let synthesizer = plan.capture(&mut conn).await.unwrap();
    assert_eq!(conn.queries[0].0, "SELECT * FROM t_order_0 WHERE user_id = ?");

    let unit = synthesizer
        .generate_revert_sql(&ForwardOutcome::new(1))
        .unwrap()
        .unwrap();
    assert_eq!(unit.sql, "INSERT INTO t_order_0 VALUES (?,?,?)");
    assert_eq!(
        unit.parameters,
        vec![vec![
            SqlValue::from(5),
            SqlValue::from(1),
            SqlValue::from("init")
        ]]
    );
}

#[tokio::test]
async fn test_failed_snapshot_query_is_classified() {
    let (tx, unit) = update_status();
    let plan = RevertEngineFactory::new_plan(&tx, &unit).unwrap();
    let mut conn = RecordingConnection::new(vec![]);
    conn.fail_queries = true;

    let err = plan.capture(&mut conn).await.unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::SnapshotQueryFailure);
    assert!(err.is_retriable());
    assert_eq!(err.table(), Some("t_order_0"));
}

#[tokio::test]
async fn test_update_matching_nothing_needs_no_revert() {
    let (tx, unit) = update_status();
    let plan = RevertEngineFactory::new_plan(&tx, &unit).unwrap();
    let mut conn = RecordingConnection::new(vec![]);
    let synthesizer = plan.capture(&mut conn).await.unwrap();
    assert!(synthesizer
        .generate_revert_sql(&ForwardOutcome::new(0))
        .unwrap()
        .is_none());
}
