//! Bounded retry budget

use shardsaga_core::SagaConfig;
use std::time::Duration;

/// How many times a unit of work may run and how long to wait in between
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn forward(config: &SagaConfig) -> Self {
        Self::new(
            config.transaction_max_retries,
            config.transaction_retry_delay(),
        )
    }

    pub fn compensation(config: &SagaConfig) -> Self {
        Self::new(
            config.compensation_max_retries,
            config.compensation_retry_delay(),
        )
    }

    /// Whether another attempt may follow the 1-based `attempt` that just failed
    pub fn allows_another(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Sleep between attempts
    pub async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}
