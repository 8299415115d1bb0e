//! Correlation identifiers
//!
//! A saga is the unit of correlation: every log event, execution record and
//! compensation attempt carries the id of the saga it belongs to.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier of one distributed (saga) transaction
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SagaId(String);

impl SagaId {
    /// Generate a new SagaId using UUIDv7 (time ordered)
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Get the string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Rebuild an id read back from durable storage
    pub fn from_string(s: String) -> Self {
        Self(s)
    }
}

impl Default for SagaId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SagaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
