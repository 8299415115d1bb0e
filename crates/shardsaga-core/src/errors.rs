use thiserror::Error;

/// Result type alias using the canonical ExError
pub type Result<T> = std::result::Result<T, ExError>;

// ========== Error Facility ==========

/// Canonical error kind taxonomy
///
/// Every failure surfaced by the revert engine or the saga coordinator is
/// classified by one of these kinds. The kind decides whether the coordinator
/// may retry (see [`ExErrorKind::is_retriable`]) and maps to a stable code
/// usable by operators and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExErrorKind {
    // Structural (never retried)
    UnsupportedStatement,
    MissingPrimaryKey,
    /// A primary key column has no value in an inserted row
    MissingPrimaryKeyValue,
    /// The forward insert did not return the generated key a revert needs
    MissingGeneratedKey,
    /// An assignment or predicate value is not a parameter, text or number
    UnsupportedAssignmentExpression,
    ParameterIndexOutOfRange,
    RouteResolutionFailure,
    /// No connection is registered for the route unit's data source
    ConnectionUnavailable,

    // Transient database failures (retried)
    Database,
    SnapshotQueryFailure,
    ForwardExecutionFailure,
    CompensationExecutionFailure,

    // Lifecycle
    InvalidConfig,
    InvalidState,

    // Integration/IO
    Persistence,
    Serialization,
    Io,

    // Internal
    Internal,
}

impl ExErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ExErrorKind::UnsupportedStatement => "ERR_UNSUPPORTED_STATEMENT",
            ExErrorKind::MissingPrimaryKey => "ERR_MISSING_PRIMARY_KEY",
            ExErrorKind::MissingPrimaryKeyValue => "ERR_MISSING_PRIMARY_KEY_VALUE",
            ExErrorKind::MissingGeneratedKey => "ERR_MISSING_GENERATED_KEY",
            ExErrorKind::UnsupportedAssignmentExpression => {
                "ERR_UNSUPPORTED_ASSIGNMENT_EXPRESSION"
            }
            ExErrorKind::ParameterIndexOutOfRange => "ERR_PARAMETER_INDEX_OUT_OF_RANGE",
            ExErrorKind::RouteResolutionFailure => "ERR_ROUTE_RESOLUTION_FAILURE",
            ExErrorKind::ConnectionUnavailable => "ERR_CONNECTION_UNAVAILABLE",
            ExErrorKind::Database => "ERR_DATABASE",
            ExErrorKind::SnapshotQueryFailure => "ERR_SNAPSHOT_QUERY_FAILURE",
            ExErrorKind::ForwardExecutionFailure => "ERR_FORWARD_EXECUTION_FAILURE",
            ExErrorKind::CompensationExecutionFailure => "ERR_COMPENSATION_EXECUTION_FAILURE",
            ExErrorKind::InvalidConfig => "ERR_INVALID_CONFIG",
            ExErrorKind::InvalidState => "ERR_INVALID_STATE",
            ExErrorKind::Persistence => "ERR_PERSISTENCE",
            ExErrorKind::Serialization => "ERR_SERIALIZATION",
            ExErrorKind::Io => "ERR_IO",
            ExErrorKind::Internal => "ERR_INTERNAL",
        }
    }

    /// Whether a failure of this kind may succeed on another attempt
    ///
    /// Only database round trips are retried. Structural failures abort
    /// immediately without consuming retry budget.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            ExErrorKind::Database
                | ExErrorKind::SnapshotQueryFailure
                | ExErrorKind::ForwardExecutionFailure
                | ExErrorKind::CompensationExecutionFailure
        )
    }
}

/// Canonical structured error type
///
/// Carries the classification plus the route-unit context (data source,
/// actual table) the failure happened on.
#[derive(Debug, Clone)]
pub struct ExError {
    kind: ExErrorKind,
    op: Option<String>,
    data_source: Option<String>,
    table: Option<String>,
    message: String,
    source: Option<Box<ExError>>,
}

impl ExError {
    /// Create a new error with the specified kind
    pub fn new(kind: ExErrorKind) -> Self {
        Self {
            kind,
            op: None,
            data_source: None,
            table: None,
            message: String::new(),
            source: None,
        }
    }

    /// Add operation context
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Add data source context
    pub fn with_data_source(mut self, data_source: impl Into<String>) -> Self {
        self.data_source = Some(data_source.into());
        self
    }

    /// Add table context (logic or actual table name)
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Add custom message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Add source error
    pub fn with_source(mut self, source: ExError) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Re-classify an underlying failure, keeping it as the source
    ///
    /// Used when a raw `Database` error crosses a phase boundary (snapshot,
    /// forward, compensation) and must be reported as that phase's failure.
    pub fn wrap(kind: ExErrorKind, source: ExError) -> Self {
        let mut err = ExError::new(kind).with_message(source.message.clone());
        err.data_source = source.data_source.clone();
        err.table = source.table.clone();
        err.with_source(source)
    }

    /// Get the error kind
    pub fn kind(&self) -> ExErrorKind {
        self.kind
    }

    /// Get the stable error code
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Shorthand for `kind().is_retriable()`
    pub fn is_retriable(&self) -> bool {
        self.kind.is_retriable()
    }

    /// Get the operation context, if any
    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    /// Get the data source context, if any
    pub fn data_source(&self) -> Option<&str> {
        self.data_source.as_deref()
    }

    /// Get the table context, if any
    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the source error, if any
    pub fn source_error(&self) -> Option<&ExError> {
        self.source.as_deref()
    }
}

impl std::fmt::Display for ExError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.code())?;
        if let Some(op) = &self.op {
            write!(f, " in operation '{}'", op)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(data_source) = &self.data_source {
            write!(f, " (data_source: {})", data_source)?;
        }
        if let Some(table) = &self.table {
            write!(f, " (table: {})", table)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

// ========== End Error Facility ==========

/// Typed structural failures of revert synthesis and routing
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SagaError {
    /// Statement is neither INSERT, UPDATE nor DELETE
    #[error("Unsupported SQL statement: {kind}")]
    UnsupportedStatement { kind: String },

    /// Table declares no primary key
    #[error("Not supported table without primary key: {table}")]
    MissingPrimaryKey { table: String },

    /// Inserted row carries no value for a primary key column
    #[error("No value for primary key column {column} in insert into {table}")]
    MissingPrimaryKeyValue { table: String, column: String },

    /// Forward insert returned fewer generated keys than inserted rows
    #[error("Generated key #{row} missing for insert into {table}")]
    MissingGeneratedKey { table: String, row: usize },

    /// Assignment value is an expression the revert engine cannot evaluate
    #[error("Unsupported expression for column {column}: {expression}")]
    UnsupportedAssignmentExpression { column: String, expression: String },

    /// Parameter marker points past the bound parameter list
    #[error("Parameter index {index} out of range ({available} bound parameters)")]
    ParameterIndexOutOfRange { index: usize, available: usize },

    /// Route result has no table unit for the data source
    #[error("Could not find actual table name of route unit on data source {data_source}")]
    DataSourceNotRouted { data_source: String },

    /// Table unit has no routing table for the logic table
    #[error("Could not get available actual table name of {logic_table} on data source {data_source}")]
    ActualTableNotRouted {
        data_source: String,
        logic_table: String,
    },
}

impl From<SagaError> for ExError {
    fn from(err: SagaError) -> Self {
        let message = err.to_string();
        match err {
            SagaError::UnsupportedStatement { .. } => {
                ExError::new(ExErrorKind::UnsupportedStatement).with_message(message)
            }
            SagaError::MissingPrimaryKey { table } => ExError::new(ExErrorKind::MissingPrimaryKey)
                .with_table(table)
                .with_message(message),
            SagaError::MissingPrimaryKeyValue { table, .. } => {
                ExError::new(ExErrorKind::MissingPrimaryKeyValue)
                    .with_table(table)
                    .with_message(message)
            }
            SagaError::MissingGeneratedKey { table, .. } => {
                ExError::new(ExErrorKind::MissingGeneratedKey)
                    .with_table(table)
                    .with_message(message)
            }
            SagaError::UnsupportedAssignmentExpression { .. } => {
                ExError::new(ExErrorKind::UnsupportedAssignmentExpression).with_message(message)
            }
            SagaError::ParameterIndexOutOfRange { .. } => {
                ExError::new(ExErrorKind::ParameterIndexOutOfRange).with_message(message)
            }
            SagaError::DataSourceNotRouted { data_source } => {
                ExError::new(ExErrorKind::RouteResolutionFailure)
                    .with_data_source(data_source)
                    .with_message(message)
            }
            SagaError::ActualTableNotRouted {
                data_source,
                logic_table,
            } => ExError::new(ExErrorKind::RouteResolutionFailure)
                .with_data_source(data_source)
                .with_table(logic_table)
                .with_message(message),
        }
    }
}

impl From<serde_json::Error> for ExError {
    fn from(err: serde_json::Error) -> Self {
        ExError::new(ExErrorKind::Serialization).with_message(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_kinds_are_not_retriable() {
        for kind in [
            ExErrorKind::UnsupportedStatement,
            ExErrorKind::MissingPrimaryKey,
            ExErrorKind::MissingPrimaryKeyValue,
            ExErrorKind::MissingGeneratedKey,
            ExErrorKind::UnsupportedAssignmentExpression,
            ExErrorKind::ParameterIndexOutOfRange,
            ExErrorKind::RouteResolutionFailure,
            ExErrorKind::ConnectionUnavailable,
            ExErrorKind::InvalidState,
        ] {
            assert!(!kind.is_retriable(), "{:?} must not be retried", kind);
        }
    }

    #[test]
    fn test_database_kinds_are_retriable() {
        for kind in [
            ExErrorKind::Database,
            ExErrorKind::SnapshotQueryFailure,
            ExErrorKind::ForwardExecutionFailure,
            ExErrorKind::CompensationExecutionFailure,
        ] {
            assert!(kind.is_retriable(), "{:?} should be retried", kind);
        }
    }

    #[test]
    fn test_missing_primary_key_conversion() {
        let err: ExError = SagaError::MissingPrimaryKey {
            table: "t_order".to_string(),
        }
        .into();
        assert_eq!(err.kind(), ExErrorKind::MissingPrimaryKey);
        assert_eq!(err.code(), "ERR_MISSING_PRIMARY_KEY");
        assert_eq!(err.table(), Some("t_order"));
    }

    #[test]
    fn test_wrap_keeps_source_and_context() {
        let raw = ExError::new(ExErrorKind::Database)
            .with_data_source("ds_0")
            .with_message("disk I/O error");
        let wrapped = ExError::wrap(ExErrorKind::SnapshotQueryFailure, raw);
        assert_eq!(wrapped.kind(), ExErrorKind::SnapshotQueryFailure);
        assert_eq!(wrapped.data_source(), Some("ds_0"));
        assert_eq!(
            wrapped.source_error().map(|e| e.kind()),
            Some(ExErrorKind::Database)
        );
    }

    #[test]
    fn test_display_includes_code_and_context() {
        let err = ExError::new(ExErrorKind::RouteResolutionFailure)
            .with_op("resolve_actual_table")
            .with_data_source("ds_1")
            .with_message("no table unit");
        let shown = err.to_string();
        assert!(shown.starts_with("[ERR_ROUTE_RESOLUTION_FAILURE]"));
        assert!(shown.contains("resolve_actual_table"));
        assert!(shown.contains("ds_1"));
    }
}
