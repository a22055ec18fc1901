//! Payroll scheduler settings.
//!
//! Durations are written as milliseconds in `config.toml` and converted to
//! [`Duration`] for the scheduler and retry runner.

use crate::core::retry::RetryPolicy;
use serde::Deserialize;
use std::time::Duration;

/// `[payroll]` section of config.toml
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PayrollConfig {
    /// Start the background scheduler at all
    pub enabled: bool,
    /// Pause before the first run so the connection pool can settle
    pub warmup_ms: u64,
    /// Delay before retrying the month after a failed run
    pub failure_retry_ms: u64,
    /// Wait before each attempt in one retry cycle; its length is the attempt count
    pub backoff_ms: Vec<u64>,
    /// Bound on each health-check ping
    pub ping_timeout_ms: u64,
    /// Bound on each payroll attempt
    pub attempt_timeout_ms: u64,
}

impl Default for PayrollConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            warmup_ms: 2_000,
            failure_retry_ms: 15_000,
            backoff_ms: vec![0, 750, 2_000],
            ping_timeout_ms: 3_000,
            attempt_timeout_ms: 10_000,
        }
    }
}

impl PayrollConfig {
    /// Warm-up pause as a [`Duration`].
    #[must_use]
    pub const fn warmup(&self) -> Duration {
        Duration::from_millis(self.warmup_ms)
    }

    /// Delay after a failed run as a [`Duration`].
    #[must_use]
    pub const fn failure_retry(&self) -> Duration {
        Duration::from_millis(self.failure_retry_ms)
    }

    /// Retry policy for one scheduled run.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            backoffs: self
                .backoff_ms
                .iter()
                .copied()
                .map(Duration::from_millis)
                .collect(),
            ping_timeout: Duration::from_millis(self.ping_timeout_ms),
            attempt_timeout: Duration::from_millis(self.attempt_timeout_ms),
        }
    }
}
