//! Ledger store - the transactional persistence surface used by payroll.
//!
//! Every function takes any [`ConnectionTrait`], so callers compose them inside
//! a single `DatabaseTransaction`. The locking reads (`*_for_update`) must be
//! the first statements of that transaction: they are what serialises a
//! scheduled run against a forced run on the same budget.

use crate::{
    entities::{
        AutoBalanceSource, Budget, BudgetMember, Direction, LedgerEntry, auto_balance_source,
        budget, ledger_entry,
    },
    errors::{Error, Result},
    money::Money,
};
use chrono::{DateTime, Utc};
use sea_orm::{
    Condition, DatabaseConnection, FromQueryResult, QueryOrder, QuerySelect, Set,
    prelude::*,
    sea_query::Expr,
};
use tracing::debug;

// CAST keeps the aggregate an integer on backends where SUM(BIGINT) widens.
const BALANCE_EXPR: &str =
    "CAST(COALESCE(SUM(CASE WHEN credit THEN amount ELSE -amount END), 0) AS BIGINT)";

#[derive(Debug, FromQueryResult)]
struct BalanceRow {
    balance: i64,
}

/// Input for [`insert_ledger_entry`].
#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    /// Budget the entry is written against
    pub budget_id: i64,
    /// Acting user, None for system entries
    pub actor_id: Option<i64>,
    /// Human-readable description
    pub description: String,
    /// Credit or debit
    pub direction: Direction,
    /// Strictly positive amount
    pub amount: Money,
}

impl NewLedgerEntry {
    /// A system-generated entry (no actor).
    #[must_use]
    pub fn system(
        budget_id: i64,
        description: impl Into<String>,
        direction: Direction,
        amount: Money,
    ) -> Self {
        Self {
            budget_id,
            actor_id: None,
            description: description.into(),
            direction,
            amount,
        }
    }
}

/// Returns every budget owed a payroll for the month starting at `month_start`,
/// locking each returned row until the surrounding transaction ends.
///
/// Eligible means `payroll > 0` and the run marker is absent or older than the
/// month start. Rows come back in id order so lock acquisition is consistent.
///
/// # Arguments
/// * `conn` - Open transaction; the locks last until it ends
/// * `month_start` - First instant of the month being paid
///
/// # Returns
/// * `Ok(budgets)` - Locked budgets still owed this month's payroll
pub async fn select_eligible_budgets_for_update<C>(
    conn: &C,
    month_start: DateTime<Utc>,
) -> Result<Vec<budget::Model>>
where
    C: ConnectionTrait,
{
    Budget::find()
        .filter(budget::Column::Payroll.gt(0_i64))
        .filter(
            Condition::any()
                .add(budget::Column::PayrollRunAt.is_null())
                .add(budget::Column::PayrollRunAt.lt(month_start)),
        )
        .order_by_asc(budget::Column::Id)
        .lock_exclusive()
        .all(conn)
        .await
        .map_err(Into::into)
}

/// Locks and returns a single budget for the forced/manual payroll path.
///
/// # Errors
/// [`Error::BudgetNotFound`] if the budget does not exist.
pub async fn lock_budget_for_update<C>(conn: &C, budget_id: i64) -> Result<budget::Model>
where
    C: ConnectionTrait,
{
    Budget::find_by_id(budget_id)
        .lock_exclusive()
        .one(conn)
        .await?
        .ok_or(Error::BudgetNotFound { budget_id })
}

/// Credits minus debits over all of the budget's entries.
///
/// # Arguments
/// * `conn` - Connection or transaction to read through
/// * `budget_id` - Budget to total
///
/// # Returns
/// * `Ok(balance)` - Zero when the budget has no entries
pub async fn current_balance<C>(conn: &C, budget_id: i64) -> Result<Money>
where
    C: ConnectionTrait,
{
    let row = LedgerEntry::find()
        .select_only()
        .column_as(Expr::cust(BALANCE_EXPR), "balance")
        .filter(ledger_entry::Column::BudgetId.eq(budget_id))
        .into_model::<BalanceRow>()
        .one(conn)
        .await?;

    Ok(Money::from_cents(row.map_or(0, |r| r.balance)))
}

/// Auto-balance edges for `budget_id`, ordered by source id ascending.
///
/// The order decides who gets leftover cents on remainder ties, so it must
/// not change between runs.
pub async fn auto_balance_sources<C>(
    conn: &C,
    budget_id: i64,
) -> Result<Vec<auto_balance_source::Model>>
where
    C: ConnectionTrait,
{
    AutoBalanceSource::find()
        .filter(auto_balance_source::Column::BudgetId.eq(budget_id))
        .order_by_asc(auto_balance_source::Column::SourceBudgetId)
        .all(conn)
        .await
        .map_err(Into::into)
}

/// Appends one ledger entry.
///
/// # Errors
/// [`Error::InvalidAmount`] if the amount is zero or negative; nothing is written.
pub async fn insert_ledger_entry<C>(
    conn: &C,
    entry: NewLedgerEntry,
    at: DateTime<Utc>,
) -> Result<ledger_entry::Model>
where
    C: ConnectionTrait,
{
    if !entry.amount.is_positive() {
        return Err(Error::InvalidAmount {
            amount: entry.amount,
        });
    }

    debug!(
        budget_id = entry.budget_id,
        direction = ?entry.direction,
        amount = %entry.amount,
        description = %entry.description,
        "Inserting ledger entry"
    );

    let model = ledger_entry::ActiveModel {
        budget_id: Set(entry.budget_id),
        actor_id: Set(entry.actor_id),
        description: Set(entry.description),
        credit: Set(entry.direction.is_credit()),
        amount: Set(entry.amount),
        created_at: Set(at),
        updated_at: Set(at),
        ..Default::default()
    };

    model.insert(conn).await.map_err(Into::into)
}

/// Stamps the run marker on a budget.
///
/// # Errors
/// [`Error::BudgetNotFound`] if no row was updated.
pub async fn mark_payroll_run<C>(conn: &C, budget_id: i64, at: DateTime<Utc>) -> Result<()>
where
    C: ConnectionTrait,
{
    let result = Budget::update_many()
        .col_expr(budget::Column::PayrollRunAt, Expr::value(Some(at)))
        .col_expr(budget::Column::UpdatedAt, Expr::value(at))
        .filter(budget::Column::Id.eq(budget_id))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        return Err(Error::BudgetNotFound { budget_id });
    }
    Ok(())
}

/// Checks that `actor_id` may act on `budget_id`.
///
/// A missing actor is a trusted system or API-token caller and is always
/// allowed. Otherwise the actor must be a member of the budget; non-members
/// get [`Error::BudgetNotFound`] so budget ids are not leaked.
pub async fn ensure_budget_access<C>(conn: &C, budget_id: i64, actor_id: Option<i64>) -> Result<()>
where
    C: ConnectionTrait,
{
    let Some(user_id) = actor_id else {
        return Ok(());
    };

    BudgetMember::find_by_id((budget_id, user_id))
        .one(conn)
        .await?
        .map(|_| ())
        .ok_or(Error::BudgetNotFound { budget_id })
}

/// Health check used before each payroll attempt.
///
/// # Errors
/// [`Error::Unavailable`] if the database does not answer.
pub async fn ping(db: &DatabaseConnection) -> Result<()> {
    db.ping().await.map_err(|e| Error::Unavailable {
        message: e.to_string(),
    })
}
