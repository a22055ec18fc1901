//! Shared test utilities.
//!
//! Helpers for setting up an in-memory database and inserting fixtures
//! directly, bypassing the payroll engine.

use crate::{
    entities::{
        Direction, LedgerEntry, auto_balance_source, budget, budget_member, ledger_entry,
    },
    errors::Result,
    money::Money,
};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectOptions, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, QueryOrder, Set,
};

/// Creates an in-memory `SQLite` database with all tables initialized.
///
/// The pool is capped at one connection: every `:memory:` connection is a
/// separate database, and concurrent callers must queue on the same one.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1).min_connections(1);
    let db = sea_orm::Database::connect(options).await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Creates a budget with the given payroll (in cents), auto-balance off, never paid.
pub async fn create_test_budget(
    db: &DatabaseConnection,
    name: &str,
    payroll_cents: i64,
) -> Result<budget::Model> {
    let now = Utc::now();
    budget::ActiveModel {
        name: Set(name.to_string()),
        payroll: Set(Money::from_cents(payroll_cents)),
        payroll_run_at: Set(None),
        auto_balance_enabled: Set(false),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Overwrites a budget's run marker.
pub async fn set_payroll_run_at(
    db: &DatabaseConnection,
    budget_id: i64,
    run_at: Option<DateTime<Utc>>,
) -> Result<()> {
    budget::ActiveModel {
        id: Set(budget_id),
        payroll_run_at: Set(run_at),
        ..Default::default()
    }
    .update(db)
    .await?;
    Ok(())
}

/// Turns auto-balance on for a budget.
pub async fn enable_auto_balance(db: &DatabaseConnection, budget_id: i64) -> Result<()> {
    budget::ActiveModel {
        id: Set(budget_id),
        auto_balance_enabled: Set(true),
        ..Default::default()
    }
    .update(db)
    .await?;
    Ok(())
}

/// Inserts a ledger entry attributed to user 1.
pub async fn create_test_entry(
    db: &DatabaseConnection,
    budget_id: i64,
    direction: Direction,
    cents: i64,
) -> Result<ledger_entry::Model> {
    let now = Utc::now();
    ledger_entry::ActiveModel {
        budget_id: Set(budget_id),
        actor_id: Set(Some(1)),
        description: Set("Test entry".to_string()),
        credit: Set(direction.is_credit()),
        amount: Set(Money::from_cents(cents)),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Inserts an auto-balance edge without validation.
pub async fn create_test_source(
    db: &DatabaseConnection,
    budget_id: i64,
    source_budget_id: i64,
    weight: i32,
) -> Result<()> {
    auto_balance_source::Entity::insert(auto_balance_source::ActiveModel {
        budget_id: Set(budget_id),
        source_budget_id: Set(source_budget_id),
        weight: Set(weight),
    })
    .exec_without_returning(db)
    .await?;
    Ok(())
}

/// Makes `user_id` a member of the budget.
pub async fn add_test_member(db: &DatabaseConnection, budget_id: i64, user_id: i64) -> Result<()> {
    budget_member::Entity::insert(budget_member::ActiveModel {
        budget_id: Set(budget_id),
        user_id: Set(user_id),
    })
    .exec_without_returning(db)
    .await?;
    Ok(())
}

/// All entries of a budget in insertion order.
pub async fn entries_for(
    db: &DatabaseConnection,
    budget_id: i64,
) -> Result<Vec<ledger_entry::Model>> {
    LedgerEntry::find()
        .filter(ledger_entry::Column::BudgetId.eq(budget_id))
        .order_by_asc(ledger_entry::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Installs a trigger that aborts any ledger insert for `budget_id`,
/// used to force a failure part-way through a payroll run.
pub async fn reject_entries_for(db: &DatabaseConnection, budget_id: i64) -> Result<()> {
    db.execute_unprepared(&format!(
        "CREATE TRIGGER reject_budget_{budget_id} BEFORE INSERT ON ledger_entries \
         WHEN NEW.budget_id = {budget_id} \
         BEGIN SELECT RAISE(ABORT, 'ledger entry rejected'); END;"
    ))
    .await?;
    Ok(())
}

/// Removes the trigger installed by [`reject_entries_for`].
pub async fn accept_entries_for(db: &DatabaseConnection, budget_id: i64) -> Result<()> {
    db.execute_unprepared(&format!("DROP TRIGGER reject_budget_{budget_id};"))
        .await?;
    Ok(())
}
