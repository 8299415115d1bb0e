//! Data model consumed from the parser, router and metadata catalog
//!
//! The structures here are produced outside this workspace (SQL parser,
//! sharding router, metadata catalog) and are read-only to the revert engine.

pub mod metadata;
pub mod route;
pub mod statement;
pub mod value;

pub use metadata::{ColumnMetadata, TableMetadata};
pub use route::{DataNode, RouteResult, RouteUnit, RoutingTable, SqlUnit, TableUnit};
pub use statement::{
    Assignment, Condition, DeleteStatement, InsertStatement, InsertValue, Predicate,
    SqlStatement, UpdateStatement, ValueExpr,
};
pub use value::{Number, SqlValue};

/// One logical statement of a saga
///
/// Holds the parsed statement, the router's output for it and the metadata
/// of its table. Created once per submitted statement and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct LogicSqlTransaction {
    /// Logical SQL text as submitted by the application
    pub sql: String,
    pub statement: SqlStatement,
    pub route_result: RouteResult,
    pub table_metadata: TableMetadata,
}

impl LogicSqlTransaction {
    pub fn new(
        sql: impl Into<String>,
        statement: SqlStatement,
        route_result: RouteResult,
        table_metadata: TableMetadata,
    ) -> Self {
        Self {
            sql: sql.into(),
            statement,
            route_result,
            table_metadata,
        }
    }
}
