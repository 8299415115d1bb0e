//! Error handling for shardsaga-store
//!
//! Wraps shardsaga-core ExError with store-specific helpers

use shardsaga_core::errors::{ExError, ExErrorKind};

/// Result type alias using ExError
pub type Result<T> = std::result::Result<T, ExError>;

/// Create a migration error
pub fn migration_error(migration_id: &str, reason: &str) -> ExError {
    ExError::new(ExErrorKind::Persistence)
        .with_op("migration")
        .with_message(format!("Migration {} failed: {}", migration_id, reason))
}

/// Create a checksum mismatch error
pub fn checksum_mismatch(migration_id: &str, expected: &str, actual: &str) -> ExError {
    ExError::new(ExErrorKind::Persistence)
        .with_op("migration_checksum")
        .with_message(format!(
            "Checksum mismatch for migration {}: expected {}, got {}",
            migration_id, expected, actual
        ))
}

/// Saga log failure from rusqlite::Error
pub fn from_rusqlite(err: rusqlite::Error) -> ExError {
    ExError::new(ExErrorKind::Persistence)
        .with_op("sqlite")
        .with_message(err.to_string())
}

/// Shard database failure from rusqlite::Error
///
/// Reported as `Database` so the coordinator may retry it.
pub fn database_error(data_source: &str, err: rusqlite::Error) -> ExError {
    ExError::new(ExErrorKind::Database)
        .with_op("sqlite")
        .with_data_source(data_source)
        .with_message(err.to_string())
}

/// A blocking task or lock failed
pub fn internal_error(operation: &str, reason: impl std::fmt::Display) -> ExError {
    ExError::new(ExErrorKind::Internal)
        .with_op(operation)
        .with_message(reason.to_string())
}
