//! Bounded retry around one payroll attempt.
//!
//! Each attempt waits out its backoff, health-checks the store, then runs the
//! operation. Transient failures (the connection is no longer usable) move on
//! to the next attempt; permanent failures end the cycle at once. Cancellation
//! is checked before every wait and every attempt and wins over both, and it
//! interrupts a pending health check, but an attempt that has started is
//! always allowed to finish.

use crate::{
    core::{
        ledger,
        payroll::{self, PayrollApplication},
    },
    errors::{Error, FailureKind, Result},
};
use chrono::Local;
use sea_orm::DatabaseConnection;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Timing for one retry cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Wait before each attempt; the first is usually zero
    pub backoffs: Vec<Duration>,
    /// Bound on each health check
    pub ping_timeout: Duration,
    /// Bound on each attempt
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoffs: vec![
                Duration::ZERO,
                Duration::from_millis(750),
                Duration::from_secs(2),
            ],
            ping_timeout: Duration::from_secs(3),
            attempt_timeout: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Backoff schedule with at least one (immediate) attempt.
    fn schedule(&self) -> Vec<Duration> {
        if self.backoffs.is_empty() {
            vec![Duration::ZERO]
        } else {
            self.backoffs.clone()
        }
    }
}

/// How a retry cycle ended.
#[derive(Debug)]
pub enum RetryOutcome<T> {
    /// An attempt succeeded
    Completed(T),
    /// Every allowed attempt failed, or one failed permanently
    Failed {
        /// The last error seen
        error: Error,
        /// Attempts actually started (including failed health checks)
        attempts: usize,
    },
    /// The cancellation token fired before the cycle finished
    Cancelled,
}

impl<T> RetryOutcome<T> {
    /// Collapses the outcome into a `Result`, mapping cancellation to [`Error::Cancelled`].
    pub fn into_result(self) -> Result<T> {
        match self {
            Self::Completed(value) => Ok(value),
            Self::Failed { error, .. } => Err(error),
            Self::Cancelled => Err(Error::Cancelled),
        }
    }
}

/// Runs `attempt` under `policy`, health-checking with `ping` first each time.
///
/// A failed or timed-out ping counts as a transient failure. A timed-out
/// attempt counts as permanent: the operation may have done work, so the
/// scheduler's slower retry decides what happens next.
pub async fn run_with_retry<T, P, PF, A, AF>(
    token: &CancellationToken,
    policy: &RetryPolicy,
    mut ping: P,
    mut attempt: A,
) -> RetryOutcome<T>
where
    P: FnMut() -> PF,
    PF: Future<Output = Result<()>>,
    A: FnMut() -> AF,
    AF: Future<Output = Result<T>>,
{
    let schedule = policy.schedule();
    let total = schedule.len();
    let mut last_error = None;

    for (index, delay) in schedule.into_iter().enumerate() {
        let number = index + 1;

        if !delay.is_zero() {
            tokio::select! {
                () = token.cancelled() => return RetryOutcome::Cancelled,
                () = tokio::time::sleep(delay) => {}
            }
        }
        if token.is_cancelled() {
            return RetryOutcome::Cancelled;
        }

        // The ping holds no transaction, so it can be abandoned on shutdown.
        let health = tokio::select! {
            () = token.cancelled() => return RetryOutcome::Cancelled,
            result = bounded(policy.ping_timeout, "database ping", ping()) => result,
        };
        if let Err(error) = health {
            warn!(attempt = number, total, error = %error, "Health check failed");
            last_error = Some(Error::Unavailable {
                message: error.to_string(),
            });
            continue;
        }

        match bounded(policy.attempt_timeout, "payroll attempt", attempt()).await {
            Ok(value) => {
                debug!(attempt = number, "Attempt succeeded");
                return RetryOutcome::Completed(value);
            }
            Err(error) => {
                let kind = error.failure_kind();
                warn!(attempt = number, total, ?kind, error = %error, "Attempt failed");
                match kind {
                    FailureKind::Transient => last_error = Some(error),
                    FailureKind::Cancelled => return RetryOutcome::Cancelled,
                    FailureKind::Permanent => {
                        return RetryOutcome::Failed {
                            error,
                            attempts: number,
                        };
                    }
                }
            }
        }
    }

    RetryOutcome::Failed {
        error: last_error.unwrap_or(Error::Unavailable {
            message: "no attempts were made".to_string(),
        }),
        attempts: total,
    }
}

/// One scheduled payroll run: ping, then pay every eligible budget, with
/// retries. The wall clock is read afresh for each attempt.
pub async fn run_payroll_with_retry(
    db: &DatabaseConnection,
    token: &CancellationToken,
    policy: &RetryPolicy,
) -> RetryOutcome<Vec<PayrollApplication>> {
    run_with_retry(
        token,
        policy,
        || ledger::ping(db),
        || async move {
            let now = Local::now();
            payroll::run_monthly_payroll_report(db, &now).await
        },
    )
    .await
}

async fn bounded<T, F>(limit: Duration, operation: &'static str, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(limit, future)
        .await
        .map_err(|_| Error::Timeout {
            operation,
            after: limit,
        })?
}
