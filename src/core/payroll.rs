//! Payroll business logic
//!
//! Credits each budget's configured payroll once per calendar month. When a
//! budget has auto-balance enabled and is in deficit, the deficit is first
//! covered by debiting its weighted source budgets. Each run happens inside a
//! single database transaction: the eligible budgets are row-locked first, and
//! every entry and run-marker update commits or rolls back together.
//!
//! The run marker (`payroll_run_at`) is what makes a run idempotent within a
//! month; a forced run skips that check but still ignores budgets with no
//! payroll.

use crate::{
    core::{
        allocator::{self, WeightedSource},
        calendar, ledger,
        ledger::NewLedgerEntry,
    },
    entities::{Direction, budget},
    errors::Result,
    money::Money,
};
use chrono::{DateTime, TimeZone, Utc};
use sea_orm::{ConnectionTrait, DatabaseConnection, TransactionTrait};
use std::fmt::Write;
use tracing::{debug, info, instrument};

/// The month a payroll run applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayrollPeriod {
    /// Instant the run happens at, used for entry timestamps and the run marker
    pub now: DateTime<Utc>,
    /// First instant of the month in the caller's time zone
    pub month_start: DateTime<Utc>,
    /// Month name and year, e.g. "March 2024"
    pub label: String,
}

impl PayrollPeriod {
    /// Period for the calendar month containing `now`, in `now`'s time zone.
    pub fn containing<Tz: TimeZone>(now: &DateTime<Tz>) -> Result<Self> {
        let month_start = calendar::month_start(now)?;
        Ok(Self {
            now: now.with_timezone(&Utc),
            month_start: month_start.with_timezone(&Utc),
            label: now.naive_local().format("%B %Y").to_string(),
        })
    }

    /// Description used for the payroll credit entry.
    #[must_use]
    pub fn payroll_description(&self) -> String {
        format!("Payroll {}", self.label)
    }
}

/// Description used for both sides of an auto-balance transfer.
#[must_use]
pub fn auto_balance_description(budget_name: &str) -> String {
    format!("Auto-balance for {budget_name}")
}

/// A debit taken from one source budget to cover a deficit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDebit {
    /// Budget that was debited
    pub source_budget_id: i64,
    /// Amount debited
    pub amount: Money,
}

/// Funds moved into a budget before its payroll was credited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoBalanceTransfer {
    /// Magnitude of the negative balance that triggered the transfer
    pub deficit: Money,
    /// One debit per source with a positive allocation
    pub debits: Vec<SourceDebit>,
    /// Total credited to the target; equals the deficit when any source has weight
    pub total: Money,
}

/// Everything written for one budget by a payroll run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayrollApplication {
    /// Budget that received payroll
    pub budget_id: i64,
    /// Its name at the time of the run
    pub budget_name: String,
    /// Payroll amount credited
    pub payroll: Money,
    /// Transfer made before the credit, if any
    pub auto_balance: Option<AutoBalanceTransfer>,
    /// Value written to the run marker
    pub run_at: DateTime<Utc>,
}

/// True if the budget's run marker falls inside the current month.
#[must_use]
pub fn already_paid(budget: &budget::Model, month_start: DateTime<Utc>) -> bool {
    budget
        .payroll_run_at
        .is_some_and(|run_at| run_at >= month_start)
}

/// Applies payroll to one budget inside the caller's transaction.
///
/// The budget row must already be locked by the caller.
///
/// # Arguments
/// * `conn` - Open transaction holding the budget's row lock
/// * `budget` - The locked budget, as read inside that transaction
/// * `period` - Month being paid
/// * `force` - Skip the already-paid-this-month check
///
/// # Returns
/// * `Ok(Some(application))` - Entries written and run marker advanced
/// * `Ok(None)` - No payroll configured, or already paid and not forced
pub async fn apply_budget_payroll<C>(
    conn: &C,
    budget: &budget::Model,
    period: &PayrollPeriod,
    force: bool,
) -> Result<Option<PayrollApplication>>
where
    C: ConnectionTrait,
{
    if !budget.payroll.is_positive() {
        return Ok(None);
    }
    if !force && already_paid(budget, period.month_start) {
        debug!(budget_id = budget.id, "Payroll already applied this month");
        return Ok(None);
    }

    let auto_balance = if budget.auto_balance_enabled {
        apply_auto_balance(conn, budget, period.now).await?
    } else {
        None
    };

    ledger::insert_ledger_entry(
        conn,
        NewLedgerEntry::system(
            budget.id,
            period.payroll_description(),
            Direction::Credit,
            budget.payroll,
        ),
        period.now,
    )
    .await?;

    // The marker never moves backwards, even if a caller passes an older clock.
    let run_at = budget
        .payroll_run_at
        .map_or(period.now, |previous| previous.max(period.now));
    ledger::mark_payroll_run(conn, budget.id, run_at).await?;

    Ok(Some(PayrollApplication {
        budget_id: budget.id,
        budget_name: budget.name.clone(),
        payroll: budget.payroll,
        auto_balance,
        run_at,
    }))
}

/// Covers a negative balance from the budget's weighted sources.
///
/// Returns `None` if the balance is not negative, there are no sources, or no
/// source has a positive weight.
async fn apply_auto_balance<C>(
    conn: &C,
    budget: &budget::Model,
    now: DateTime<Utc>,
) -> Result<Option<AutoBalanceTransfer>>
where
    C: ConnectionTrait,
{
    let balance = ledger::current_balance(conn, budget.id).await?;
    if !balance.is_negative() {
        return Ok(None);
    }
    let deficit = balance.abs();

    let sources: Vec<WeightedSource> = ledger::auto_balance_sources(conn, budget.id)
        .await?
        .into_iter()
        .map(|s| WeightedSource {
            source_budget_id: s.source_budget_id,
            weight: s.weight,
        })
        .collect();
    if sources.is_empty() {
        return Ok(None);
    }

    let allocations = allocator::allocate(deficit.cents(), &sources);
    let description = auto_balance_description(&budget.name);

    let mut debits = Vec::new();
    for (source, cents) in sources.iter().zip(allocations) {
        if cents <= 0 {
            continue;
        }
        let amount = Money::from_cents(cents);
        ledger::insert_ledger_entry(
            conn,
            NewLedgerEntry::system(
                source.source_budget_id,
                description.clone(),
                Direction::Debit,
                amount,
            ),
            now,
        )
        .await?;
        debits.push(SourceDebit {
            source_budget_id: source.source_budget_id,
            amount,
        });
    }

    let total: Money = debits.iter().map(|d| d.amount).sum();
    if !total.is_positive() {
        return Ok(None);
    }

    ledger::insert_ledger_entry(
        conn,
        NewLedgerEntry::system(budget.id, description, Direction::Credit, total),
        now,
    )
    .await?;

    info!(
        budget_id = budget.id,
        deficit = %deficit,
        sources = debits.len(),
        "Auto-balanced budget before payroll"
    );

    Ok(Some(AutoBalanceTransfer {
        deficit,
        debits,
        total,
    }))
}

/// Runs payroll for every eligible budget and returns what was written.
///
/// All budgets are processed in one transaction; any failure rolls back the
/// whole run.
#[instrument(skip(db, now), fields(month = tracing::field::Empty))]
pub async fn run_monthly_payroll_report<Tz: TimeZone>(
    db: &DatabaseConnection,
    now: &DateTime<Tz>,
) -> Result<Vec<PayrollApplication>> {
    let period = PayrollPeriod::containing(now)?;
    tracing::Span::current().record("month", period.label.as_str());

    let txn = db.begin().await?;

    let pending = ledger::select_eligible_budgets_for_update(&txn, period.month_start).await?;
    debug!(eligible = pending.len(), "Selected budgets for payroll");

    let mut applications = Vec::with_capacity(pending.len());
    for budget in &pending {
        if let Some(application) = apply_budget_payroll(&txn, budget, &period, false).await? {
            info!(
                budget_id = application.budget_id,
                payroll = %application.payroll,
                auto_balanced = application.auto_balance.is_some(),
                "Applied payroll"
            );
            applications.push(application);
        }
    }

    txn.commit().await?;

    Ok(applications)
}

/// Automatic entry point: runs payroll for every eligible budget.
///
/// # Arguments
/// * `db` - Database connection
/// * `now` - Current time; its zone decides where the month starts
///
/// # Returns
/// * `Ok(count)` - Number of payroll credits created, 0 if all were paid
/// * `Err(_)` - Nothing was written
pub async fn run_monthly_payroll<Tz: TimeZone>(
    db: &DatabaseConnection,
    now: &DateTime<Tz>,
) -> Result<usize> {
    run_monthly_payroll_report(db, now)
        .await
        .map(|applications| applications.len())
}

/// Manual entry point: runs payroll for a single budget.
///
/// With `force` the monthly idempotency check is skipped; a budget with no
/// payroll is still a no-op.
///
/// # Arguments
/// * `db` - Database connection
/// * `budget_id` - Budget to pay
/// * `actor_id` - Acting user, who must be a member; None is a trusted caller
/// * `now` - Current time; its zone decides where the month starts
/// * `force` - Pay even if already paid this month
///
/// # Returns
/// * `Ok(1)` - Payroll credited
/// * `Ok(0)` - No payroll configured, or already paid and not forced
///
/// # Errors
/// [`crate::errors::Error::BudgetNotFound`] for unknown or inaccessible budgets;
/// storage errors otherwise. Nothing is written on error.
#[instrument(skip(db, now))]
pub async fn run_budget_payroll<Tz: TimeZone>(
    db: &DatabaseConnection,
    budget_id: i64,
    actor_id: Option<i64>,
    now: &DateTime<Tz>,
    force: bool,
) -> Result<usize> {
    ledger::ensure_budget_access(db, budget_id, actor_id).await?;
    let period = PayrollPeriod::containing(now)?;

    let txn = db.begin().await?;
    let budget = ledger::lock_budget_for_update(&txn, budget_id).await?;
    let application = apply_budget_payroll(&txn, &budget, &period, force).await?;
    txn.commit().await?;

    match application {
        Some(application) => {
            info!(
                budget_id,
                payroll = %application.payroll,
                force,
                "Applied payroll manually"
            );
            Ok(1)
        }
        None => Ok(0),
    }
}

/// Formats the result of a payroll run into a human-readable summary.
#[must_use]
pub fn format_payroll_summary(label: &str, applications: &[PayrollApplication]) -> String {
    let mut summary = format!(
        "Payroll - {label} - Credited {} budget(s)\n",
        applications.len()
    );

    for application in applications {
        // Writing to a String cannot fail.
        let _ = writeln!(
            summary,
            "  {} | +${}",
            application.budget_name, application.payroll
        );
        if let Some(transfer) = &application.auto_balance {
            let _ = writeln!(
                summary,
                "    auto-balance: ${} deficit covered by {} source(s)",
                transfer.total,
                transfer.debits.len()
            );
        }
    }

    summary
}
