// Integration tests for the SQLite shard connection

use shardsaga_core::errors::ExErrorKind;
use shardsaga_core::model::SqlValue;
use shardsaga_core::{RowImage, ShardConnection};
use shardsaga_store::SqliteShardConnection;
use tempfile::TempDir;

fn shard(dir: &TempDir, data_source: &str) -> SqliteShardConnection {
    let conn = rusqlite::Connection::open(dir.path().join(format!("{}.db", data_source))).unwrap();
    conn.execute_batch(
        "CREATE TABLE t_order_0 (
            order_id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            status TEXT
        );
        INSERT INTO t_order_0 (order_id, user_id, status) VALUES (1, 10, 'init');",
    )
    .unwrap();
    SqliteShardConnection::new(data_source, conn)
}

#[tokio::test]
async fn test_query_lower_cases_column_labels() {
    let dir = TempDir::new().unwrap();
    let mut conn = shard(&dir, "ds_0");

    let rows = conn
        .query(
            "SELECT ORDER_ID, Status FROM t_order_0 WHERE user_id = ?",
            &[SqlValue::from(10)],
        )
        .await
        .unwrap();

    assert_eq!(
        rows,
        vec![RowImage::new().with("order_id", 1).with("status", "init")]
    );
}

#[tokio::test]
async fn test_rollback_discards_changes() {
    let dir = TempDir::new().unwrap();
    let mut conn = shard(&dir, "ds_0");

    conn.begin().await.unwrap();
    let outcome = conn
        .execute(
            "UPDATE t_order_0 SET status = ? WHERE user_id = ?",
            &[SqlValue::from("paid"), SqlValue::from(10)],
        )
        .await
        .unwrap();
    assert_eq!(outcome.affected_rows, 1);
    assert!(outcome.generated_keys.is_empty());
    conn.rollback().await.unwrap();

    let rows = conn
        .query("SELECT status FROM t_order_0", &[])
        .await
        .unwrap();
    assert_eq!(rows[0].get("status"), Some(&SqlValue::from("init")));
}

#[tokio::test]
async fn test_rollback_without_transaction_is_noop() {
    let dir = TempDir::new().unwrap();
    let mut conn = shard(&dir, "ds_0");
    conn.rollback().await.unwrap();
}

#[tokio::test]
async fn test_insert_reports_generated_keys() {
    let dir = TempDir::new().unwrap();
    let mut conn = shard(&dir, "ds_0");

    conn.begin().await.unwrap();
    let outcome = conn
        .execute(
            "INSERT INTO t_order_0 (user_id, status) VALUES (?, ?), (?, ?)",
            &[
                SqlValue::from(11),
                SqlValue::from("init"),
                SqlValue::from(12),
                SqlValue::from("init"),
            ],
        )
        .await
        .unwrap();
    conn.commit().await.unwrap();

    assert_eq!(outcome.affected_rows, 2);
    assert_eq!(
        outcome.generated_keys,
        vec![SqlValue::Integer(2), SqlValue::Integer(3)]
    );
}

#[tokio::test]
async fn test_failure_is_retriable_database_error() {
    let dir = TempDir::new().unwrap();
    let mut conn = shard(&dir, "ds_1");

    let err = conn
        .execute("UPDATE no_such_table SET status = ?", &[SqlValue::Null])
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ExErrorKind::Database);
    assert!(err.is_retriable());
    assert_eq!(err.data_source(), Some("ds_1"));
    assert_eq!(err.op(), Some("sqlite_execute"));
}
