//! Background payroll scheduler.
//!
//! One long-lived task per process. After a short warm-up it runs payroll
//! immediately, then sleeps until local midnight on the first of the next
//! month. A failed run is retried after a short delay without advancing the
//! month. The task stops as soon as its cancellation token fires, but only
//! between runs: a transaction in flight always finishes first.

use crate::{
    config::PayrollConfig,
    core::{
        calendar,
        payroll,
        retry::{self, RetryOutcome},
    },
};
use chrono::{DateTime, Local, TimeDelta};
use sea_orm::DatabaseConnection;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Where the scheduler is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Created, not yet started
    Idle,
    /// Sleeping until the given instant
    Waiting(DateTime<Local>),
    /// A payroll run is in progress
    Running,
    /// Terminal
    Cancelled,
}

/// Owns everything the scheduler loop touches.
#[derive(Debug)]
pub struct PayrollScheduler {
    db: DatabaseConnection,
    token: CancellationToken,
    config: PayrollConfig,
    state: SchedulerState,
}

impl PayrollScheduler {
    /// Creates an idle scheduler.
    #[must_use]
    pub fn new(
        db: DatabaseConnection,
        config: PayrollConfig,
        token: CancellationToken,
    ) -> Self {
        Self {
            db,
            token,
            config,
            state: SchedulerState::Idle,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> SchedulerState {
        self.state
    }

    /// Spawns the loop on the current runtime. Consuming `self` means a
    /// scheduler can only ever be started once.
    #[must_use]
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Drives the loop until cancelled.
    pub async fn run(mut self) {
        info!(warmup_ms = self.config.warmup_ms, "Payroll scheduler starting");

        let mut next = after(self.config.warmup());
        loop {
            self.transition(SchedulerState::Waiting(next));
            if !wait_until(&self.token, next).await {
                break;
            }

            self.transition(SchedulerState::Running);
            next = self.run_once().await;
            if self.token.is_cancelled() {
                break;
            }
        }

        self.transition(SchedulerState::Cancelled);
        info!("Payroll scheduler stopped");
    }

    /// Runs one retry cycle and returns when the next one should start.
    async fn run_once(&self) -> DateTime<Local> {
        let policy = self.config.retry_policy();
        let outcome = retry::run_payroll_with_retry(&self.db, &self.token, &policy).await;

        match outcome {
            RetryOutcome::Completed(applications) => {
                // Measured after the run, not from the instant it was due.
                let now = Local::now();
                if !applications.is_empty() {
                    let label = now.format("%B %Y").to_string();
                    debug!("{}", payroll::format_payroll_summary(&label, &applications));
                }
                match calendar::next_month_start(&now) {
                    Ok(next) => {
                        info!(
                            created = applications.len(),
                            next_run = %next,
                            "Payroll run complete"
                        );
                        next
                    }
                    Err(e) => {
                        error!(error = %e, "Could not compute next payroll date");
                        after(self.config.failure_retry())
                    }
                }
            }
            RetryOutcome::Failed { error, attempts } => {
                let next = after(self.config.failure_retry());
                warn!(
                    attempts,
                    error = %error,
                    retry_at = %next,
                    "Payroll run failed, retrying this month"
                );
                next
            }
            RetryOutcome::Cancelled => {
                debug!("Payroll run cancelled");
                Local::now()
            }
        }
    }

    fn transition(&mut self, next: SchedulerState) {
        debug!(from = ?self.state, to = ?next, "Scheduler state change");
        self.state = next;
    }
}

/// Starts the payroll scheduler for this process.
///
/// Call once at startup; cancel `token` and await the handle at shutdown.
#[must_use]
pub fn start_scheduler(
    db: DatabaseConnection,
    config: PayrollConfig,
    token: CancellationToken,
) -> JoinHandle<()> {
    PayrollScheduler::new(db, config, token).spawn()
}

/// Sleeps until `deadline`. Returns false if cancelled first.
async fn wait_until(token: &CancellationToken, deadline: DateTime<Local>) -> bool {
    if token.is_cancelled() {
        return false;
    }
    let remaining = (deadline - Local::now()).to_std().unwrap_or(Duration::ZERO);
    tokio::select! {
        () = token.cancelled() => false,
        () = tokio::time::sleep(remaining) => !token.is_cancelled(),
    }
}

fn after(duration: Duration) -> DateTime<Local> {
    let now = Local::now();
    TimeDelta::from_std(duration)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::errors::Result;
    use crate::test_utils::*;

    fn quick_config(warmup_ms: u64) -> PayrollConfig {
        PayrollConfig {
            enabled: true,
            warmup_ms,
            failure_retry_ms: 50,
            backoff_ms: vec![0, 5],
            ping_timeout_ms: 500,
            attempt_timeout_ms: 2_000,
        }
    }

    #[tokio::test]
    async fn test_cancel_during_warmup_stops_promptly() -> Result<()> {
        let db = setup_test_db().await?;
        let budget = create_test_budget(&db, "Rent", 50_000).await?;
        let token = CancellationToken::new();

        let handle = start_scheduler(db.clone(), quick_config(60_000), token.clone());
        token.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("scheduler did not stop")
            .unwrap();

        assert!(entries_for(&db, budget.id).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_runs_after_warmup_then_waits_for_next_month() -> Result<()> {
        let db = setup_test_db().await?;
        let budget = create_test_budget(&db, "Rent", 50_000).await?;
        let token = CancellationToken::new();

        let handle = start_scheduler(db.clone(), quick_config(10), token.clone());

        let mut entries = Vec::new();
        for _ in 0..100 {
            entries = entries_for(&db, budget.id).await?;
            if !entries.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].amount.cents(), 50_000);

        // Now waiting for next month; cancellation must end the wait.
        token.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("scheduler did not stop")
            .unwrap();
        assert_eq!(entries_for(&db, budget.id).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_run_retries_same_month_until_success() -> Result<()> {
        let db = setup_test_db().await?;
        let budget = create_test_budget(&db, "Rent", 50_000).await?;
        reject_entries_for(&db, budget.id).await?;
        let token = CancellationToken::new();

        let handle = start_scheduler(db.clone(), quick_config(10), token.clone());

        // Several failed cycles, each rolled back.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(entries_for(&db, budget.id).await?.is_empty());
        assert!(!handle.is_finished());

        accept_entries_for(&db, budget.id).await?;

        let mut entries = Vec::new();
        for _ in 0..100 {
            entries = entries_for(&db, budget.id).await?;
            if !entries.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let label = Local::now().format("%B %Y").to_string();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].description, format!("Payroll {label}"));

        token.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("scheduler did not stop")
            .unwrap();
        assert_eq!(entries_for(&db, budget.id).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_wait_until_past_deadline_returns_immediately() {
        let token = CancellationToken::new();
        let past = Local::now() - TimeDelta::seconds(10);
        assert!(wait_until(&token, past).await);

        token.cancel();
        assert!(!wait_until(&token, past).await);
    }

    #[test]
    fn test_new_scheduler_is_idle() {
        let db = DatabaseConnection::Disconnected;
        let scheduler = PayrollScheduler::new(db, quick_config(0), CancellationToken::new());
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }
}
