//! Saga configuration
//!
//! Recognized keys mirror the middleware's saga options (`executorSize`,
//! `transactionMaxRetries`, ...). Every key is optional; missing keys take
//! the defaults below. Unknown keys are rejected so a typo cannot silently
//! fall back to a default.

use crate::errors::{ExError, ExErrorKind, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Saga-wide strategy applied when a forward action fails for good
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecoveryPolicy {
    /// Keep retrying forward actions; exhaustion fails the saga without compensation
    #[serde(rename = "ForwardRecovery", alias = "forward", alias = "FORWARD")]
    Forward,
    /// Compensate every completed forward action once one fails for good
    #[serde(rename = "BackwardRecovery", alias = "backward", alias = "BACKWARD")]
    Backward,
}

impl RecoveryPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryPolicy::Forward => "ForwardRecovery",
            RecoveryPolicy::Backward => "BackwardRecovery",
        }
    }
}

/// Durable saga log settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct PersistenceConfig {
    pub enabled: bool,
    /// SQLite file holding the saga log
    pub path: Option<PathBuf>,
}

/// Saga configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct SagaConfig {
    /// Upper bound on route-unit groups executing concurrently
    pub executor_size: usize,
    /// Forward attempts per route unit
    pub transaction_max_retries: u32,
    /// Attempts per compensating unit
    pub compensation_max_retries: u32,
    pub transaction_retry_delay_milliseconds: u64,
    pub compensation_retry_delay_milliseconds: u64,
    pub recovery_policy: RecoveryPolicy,
    pub persistence: PersistenceConfig,
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            executor_size: 5,
            transaction_max_retries: 5,
            compensation_max_retries: 3,
            transaction_retry_delay_milliseconds: 5000,
            compensation_retry_delay_milliseconds: 3000,
            recovery_policy: RecoveryPolicy::Forward,
            persistence: PersistenceConfig::default(),
        }
    }
}

impl SagaConfig {
    /// Parse and validate a TOML document
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for malformed TOML, unknown keys or values
    /// failing [`SagaConfig::validate`].
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: SagaConfig = toml::from_str(text).map_err(|e| {
            ExError::new(ExErrorKind::InvalidConfig)
                .with_op("load_config")
                .with_message(e.to_string())
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be read, otherwise as
    /// [`SagaConfig::from_toml_str`].
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            ExError::new(ExErrorKind::Io)
                .with_op("load_config")
                .with_message(format!("{}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    /// Check value ranges
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` naming the offending key.
    pub fn validate(&self) -> Result<()> {
        let invalid = |key: &str, reason: &str| {
            Err(ExError::new(ExErrorKind::InvalidConfig)
                .with_op("validate_config")
                .with_message(format!("{}: {}", key, reason)))
        };
        if self.executor_size == 0 {
            return invalid("executorSize", "must be at least 1");
        }
        if self.transaction_max_retries == 0 {
            return invalid("transactionMaxRetries", "must be at least 1");
        }
        if self.compensation_max_retries == 0 {
            return invalid("compensationMaxRetries", "must be at least 1");
        }
        if self.persistence.enabled && self.persistence.path.is_none() {
            return invalid("persistence.path", "required when persistence is enabled");
        }
        Ok(())
    }

    pub fn transaction_retry_delay(&self) -> Duration {
        Duration::from_millis(self.transaction_retry_delay_milliseconds)
    }

    pub fn compensation_retry_delay(&self) -> Duration {
        Duration::from_millis(self.compensation_retry_delay_milliseconds)
    }
}
