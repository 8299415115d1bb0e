//! Structural description of a parsed DML statement
//!
//! Statement kind is a closed enum: adding a kind forces every dispatch site
//! (revert factory, snapshot planning) to handle it.

use crate::errors::{Result, SagaError};
use crate::model::route::DataNode;
use crate::model::value::{Number, SqlValue};

/// A value position in SQL text
#[derive(Debug, Clone, PartialEq)]
pub enum ValueExpr {
    /// `?` marker, by index into the bound parameters
    Parameter(usize),
    /// Quoted string literal
    Text(String),
    /// Numeric literal
    Number(Number),
    /// Value assigned by the database (auto-increment key)
    GeneratedKey,
    /// Anything else (function call, arithmetic, sub-query), kept as text
    Expression(String),
}

impl ValueExpr {
    /// Resolve to a concrete value using the bound parameters
    ///
    /// `column` only feeds the error message.
    ///
    /// # Errors
    ///
    /// `ParameterIndexOutOfRange` for a marker past `parameters`,
    /// `UnsupportedAssignmentExpression` for `GeneratedKey` and `Expression`,
    /// which have no value before the statement runs.
    pub fn resolve(&self, column: &str, parameters: &[SqlValue]) -> Result<SqlValue> {
        match self {
            ValueExpr::Parameter(index) => parameters.get(*index).cloned().ok_or_else(|| {
                SagaError::ParameterIndexOutOfRange {
                    index: *index,
                    available: parameters.len(),
                }
                .into()
            }),
            ValueExpr::Text(text) => Ok(SqlValue::Text(text.clone())),
            ValueExpr::Number(number) => Ok((*number).into()),
            ValueExpr::GeneratedKey => Err(SagaError::UnsupportedAssignmentExpression {
                column: column.to_string(),
                expression: "<generated key>".to_string(),
            }
            .into()),
            ValueExpr::Expression(text) => Err(SagaError::UnsupportedAssignmentExpression {
                column: column.to_string(),
                expression: text.clone(),
            }
            .into()),
        }
    }
}

/// `column = value` in a WHERE clause
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub column: String,
    pub value: ValueExpr,
}

impl Condition {
    pub fn new(column: impl Into<String>, value: ValueExpr) -> Self {
        Self {
            column: column.into(),
            value,
        }
    }
}

/// Filter selecting the rows an UPDATE or DELETE touches
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// AND-chained equality conditions; empty means every row
    Conditions(Vec<Condition>),
    /// The statement's own WHERE clause text (including the `WHERE` keyword)
    /// and the bound-parameter indexes its markers consume, in order
    Raw {
        sql: String,
        parameter_indexes: Vec<usize>,
    },
}

/// `SET column = value`
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub column: String,
    pub value: ValueExpr,
}

impl Assignment {
    pub fn new(column: impl Into<String>, value: ValueExpr) -> Self {
        Self {
            column: column.into(),
            value,
        }
    }
}

/// One row of an INSERT as the router optimized it
///
/// Parameter markers in `expressions` index into this row's own `parameters`.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertValue {
    pub expressions: Vec<ValueExpr>,
    pub parameters: Vec<SqlValue>,
    pub data_nodes: Vec<DataNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    pub table: String,
    pub columns: Vec<String>,
    pub values: Vec<InsertValue>,
    /// Column filled by the database when omitted from `columns`
    pub generated_key_column: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStatement {
    pub table: String,
    pub alias: Option<String>,
    pub assignments: Vec<Assignment>,
    pub predicate: Predicate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStatement {
    pub table: String,
    pub alias: Option<String>,
    pub predicate: Predicate,
}

/// A parsed statement, tagged by kind
#[derive(Debug, Clone, PartialEq)]
pub enum SqlStatement {
    Insert(InsertStatement),
    Update(UpdateStatement),
    Delete(DeleteStatement),
    /// Any other statement (SELECT, DDL, ...), carried only to be rejected
    Other { kind: String },
}

impl SqlStatement {
    /// Logic table name, if the statement is DML
    pub fn table(&self) -> Option<&str> {
        match self {
            SqlStatement::Insert(s) => Some(&s.table),
            SqlStatement::Update(s) => Some(&s.table),
            SqlStatement::Delete(s) => Some(&s.table),
            SqlStatement::Other { .. } => None,
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            SqlStatement::Insert(_) => "INSERT",
            SqlStatement::Update(_) => "UPDATE",
            SqlStatement::Delete(_) => "DELETE",
            SqlStatement::Other { kind } => kind,
        }
    }
}
