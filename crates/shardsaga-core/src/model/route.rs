//! Router output: where a logical statement runs

use crate::model::value::SqlValue;

/// Rewritten shard-local SQL and its bound parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SqlUnit {
    pub sql: String,
    pub parameters: Vec<SqlValue>,
}

/// One shard-local execution target
#[derive(Debug, Clone, PartialEq)]
pub struct RouteUnit {
    pub data_source_name: String,
    pub sql_unit: SqlUnit,
    /// Keys generated by the router for this unit's inserted rows, in row order
    pub generated_keys: Vec<SqlValue>,
}

impl RouteUnit {
    pub fn new(
        data_source_name: impl Into<String>,
        sql: impl Into<String>,
        parameters: Vec<SqlValue>,
    ) -> Self {
        Self {
            data_source_name: data_source_name.into(),
            sql_unit: SqlUnit {
                sql: sql.into(),
                parameters,
            },
            generated_keys: Vec::new(),
        }
    }

    pub fn with_generated_keys(mut self, keys: Vec<SqlValue>) -> Self {
        self.generated_keys = keys;
        self
    }

    pub fn parameters(&self) -> &[SqlValue] {
        &self.sql_unit.parameters
    }
}

/// Logic table to actual table mapping on one data source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingTable {
    pub logic_table_name: String,
    pub actual_table_name: String,
}

/// Tables routed to one data source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableUnit {
    pub data_source_name: String,
    pub routing_tables: Vec<RoutingTable>,
}

impl TableUnit {
    pub fn new(data_source_name: impl Into<String>) -> Self {
        Self {
            data_source_name: data_source_name.into(),
            routing_tables: Vec::new(),
        }
    }

    pub fn route(mut self, logic: impl Into<String>, actual: impl Into<String>) -> Self {
        self.routing_tables.push(RoutingTable {
            logic_table_name: logic.into(),
            actual_table_name: actual.into(),
        });
        self
    }
}

/// A physical (data source, actual table) pair an insert value was routed to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataNode {
    pub data_source_name: String,
    pub table_name: String,
}

impl DataNode {
    pub fn new(data_source_name: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            data_source_name: data_source_name.into(),
            table_name: table_name.into(),
        }
    }

    pub fn matches(&self, data_source_name: &str, table_name: &str) -> bool {
        self.data_source_name.eq_ignore_ascii_case(data_source_name)
            && self.table_name.eq_ignore_ascii_case(table_name)
    }
}

/// Ordered route units plus the shard/table mapping they were derived from
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RouteResult {
    pub route_units: Vec<RouteUnit>,
    pub table_units: Vec<TableUnit>,
}

impl RouteResult {
    pub fn new(route_units: Vec<RouteUnit>, table_units: Vec<TableUnit>) -> Self {
        Self {
            route_units,
            table_units,
        }
    }
}
