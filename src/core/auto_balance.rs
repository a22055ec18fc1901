//! Auto-balance configuration.
//!
//! A budget with auto-balance enabled draws on weighted source budgets to
//! cover a deficit before its payroll is credited. This module reads and
//! replaces that configuration; the transfer itself happens in
//! [`crate::core::payroll`].

use crate::{
    core::ledger,
    entities::{AutoBalanceSource, Budget, auto_balance_source, budget},
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{Set, TransactionTrait, prelude::*, sea_query::Expr};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{info, instrument};

/// Highest weight a source may carry.
pub const MAX_WEIGHT: i32 = 100;

/// One requested source edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceWeight {
    /// Budget to draw from
    pub source_budget_id: i64,
    /// Share of the deficit, 0 to 100
    pub weight: i32,
}

/// Current auto-balance settings of a budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoBalanceConfig {
    /// Whether transfers happen before payroll
    pub enabled: bool,
    /// Sources ordered by id
    pub sources: Vec<SourceWeight>,
}

/// Reads the auto-balance settings of a budget.
pub async fn get_auto_balance_config(
    db: &DatabaseConnection,
    budget_id: i64,
    actor_id: Option<i64>,
) -> Result<AutoBalanceConfig> {
    ledger::ensure_budget_access(db, budget_id, actor_id).await?;

    let budget = Budget::find_by_id(budget_id)
        .one(db)
        .await?
        .ok_or(Error::BudgetNotFound { budget_id })?;

    let sources = ledger::auto_balance_sources(db, budget_id)
        .await?
        .into_iter()
        .map(|s| SourceWeight {
            source_budget_id: s.source_budget_id,
            weight: s.weight,
        })
        .collect();

    Ok(AutoBalanceConfig {
        enabled: budget.auto_balance_enabled,
        sources,
    })
}

/// Checks a requested source list without touching the database.
///
/// # Errors
/// [`Error::SelfReferencingSource`], [`Error::InvalidWeight`] or
/// [`Error::DuplicateSource`] for the first offending entry.
pub fn validate_sources(budget_id: i64, sources: &[SourceWeight]) -> Result<()> {
    let mut seen = HashSet::with_capacity(sources.len());
    for source in sources {
        if source.source_budget_id == budget_id {
            return Err(Error::SelfReferencingSource { budget_id });
        }
        if !(0..=MAX_WEIGHT).contains(&source.weight) {
            return Err(Error::InvalidWeight {
                source_budget_id: source.source_budget_id,
                weight: source.weight,
            });
        }
        if !seen.insert(source.source_budget_id) {
            return Err(Error::DuplicateSource {
                source_budget_id: source.source_budget_id,
            });
        }
    }
    Ok(())
}

/// Replaces the auto-balance settings of a budget.
///
/// Every source is validated, and checked for access, before anything is
/// written. Zero-weight sources are dropped since they can never receive an
/// allocation. The flag update and edge replacement share one transaction.
#[instrument(skip(db, sources), fields(sources = sources.len()))]
pub async fn update_auto_balance_config(
    db: &DatabaseConnection,
    budget_id: i64,
    actor_id: Option<i64>,
    enabled: bool,
    sources: &[SourceWeight],
) -> Result<()> {
    ledger::ensure_budget_access(db, budget_id, actor_id).await?;
    validate_sources(budget_id, sources)?;
    for source in sources {
        ledger::ensure_budget_access(db, source.source_budget_id, actor_id).await?;
        if Budget::find_by_id(source.source_budget_id)
            .one(db)
            .await?
            .is_none()
        {
            return Err(Error::BudgetNotFound {
                budget_id: source.source_budget_id,
            });
        }
    }

    let txn = db.begin().await?;

    let updated = Budget::update_many()
        .col_expr(budget::Column::AutoBalanceEnabled, Expr::value(enabled))
        .col_expr(budget::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(budget::Column::Id.eq(budget_id))
        .exec(&txn)
        .await?;
    if updated.rows_affected == 0 {
        return Err(Error::BudgetNotFound { budget_id });
    }

    AutoBalanceSource::delete_many()
        .filter(auto_balance_source::Column::BudgetId.eq(budget_id))
        .exec(&txn)
        .await?;

    let edges: Vec<auto_balance_source::ActiveModel> = sources
        .iter()
        .filter(|s| s.weight > 0)
        .map(|s| auto_balance_source::ActiveModel {
            budget_id: Set(budget_id),
            source_budget_id: Set(s.source_budget_id),
            weight: Set(s.weight),
        })
        .collect();
    let edge_count = edges.len();
    if !edges.is_empty() {
        AutoBalanceSource::insert_many(edges)
            .exec_without_returning(&txn)
            .await?;
    }

    txn.commit().await?;

    info!(budget_id, enabled, edges = edge_count, "Updated auto-balance config");
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::*;

    fn weight(source_budget_id: i64, weight: i32) -> SourceWeight {
        SourceWeight {
            source_budget_id,
            weight,
        }
    }

    #[test]
    fn test_validate_sources() {
        assert!(validate_sources(1, &[weight(2, 70), weight(3, 30)]).is_ok());
        assert!(validate_sources(1, &[]).is_ok());
        assert!(matches!(
            validate_sources(1, &[weight(1, 50)]),
            Err(Error::SelfReferencingSource { budget_id: 1 })
        ));
        assert!(matches!(
            validate_sources(1, &[weight(2, 101)]),
            Err(Error::InvalidWeight { weight: 101, .. })
        ));
        assert!(matches!(
            validate_sources(1, &[weight(2, -1)]),
            Err(Error::InvalidWeight { weight: -1, .. })
        ));
        assert!(matches!(
            validate_sources(1, &[weight(2, 10), weight(2, 20)]),
            Err(Error::DuplicateSource { source_budget_id: 2 })
        ));
    }

    #[tokio::test]
    async fn test_update_and_get_config() -> Result<()> {
        let db = setup_test_db().await?;
        let target = create_test_budget(&db, "Target", 10_000).await?;
        let a = create_test_budget(&db, "A", 0).await?;
        let b = create_test_budget(&db, "B", 0).await?;
        let c = create_test_budget(&db, "C", 0).await?;

        update_auto_balance_config(
            &db,
            target.id,
            None,
            true,
            &[weight(b.id, 30), weight(a.id, 70), weight(c.id, 0)],
        )
        .await?;

        let config = get_auto_balance_config(&db, target.id, None).await?;
        assert!(config.enabled);
        // Zero weights are not stored; order is by source id.
        assert_eq!(config.sources, vec![weight(a.id, 70), weight(b.id, 30)]);
        Ok(())
    }

    #[tokio::test]
    async fn test_update_replaces_existing_edges() -> Result<()> {
        let db = setup_test_db().await?;
        let target = create_test_budget(&db, "Target", 10_000).await?;
        let a = create_test_budget(&db, "A", 0).await?;
        let b = create_test_budget(&db, "B", 0).await?;

        update_auto_balance_config(&db, target.id, None, true, &[weight(a.id, 100)]).await?;
        update_auto_balance_config(&db, target.id, None, false, &[weight(b.id, 40)]).await?;

        let config = get_auto_balance_config(&db, target.id, None).await?;
        assert!(!config.enabled);
        assert_eq!(config.sources, vec![weight(b.id, 40)]);
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_update_writes_nothing() -> Result<()> {
        let db = setup_test_db().await?;
        let target = create_test_budget(&db, "Target", 10_000).await?;
        let a = create_test_budget(&db, "A", 0).await?;

        update_auto_balance_config(&db, target.id, None, true, &[weight(a.id, 50)]).await?;
        let result = update_auto_balance_config(
            &db,
            target.id,
            None,
            false,
            &[weight(a.id, 50), weight(target.id, 50)],
        )
        .await;
        assert!(matches!(result, Err(Error::SelfReferencingSource { .. })));

        let config = get_auto_balance_config(&db, target.id, None).await?;
        assert!(config.enabled);
        assert_eq!(config.sources, vec![weight(a.id, 50)]);
        Ok(())
    }

    #[tokio::test]
    async fn test_update_requires_access_to_every_source() -> Result<()> {
        let db = setup_test_db().await?;
        let target = create_test_budget(&db, "Target", 10_000).await?;
        let mine = create_test_budget(&db, "Mine", 0).await?;
        let theirs = create_test_budget(&db, "Theirs", 0).await?;
        add_test_member(&db, target.id, 7).await?;
        add_test_member(&db, mine.id, 7).await?;

        update_auto_balance_config(&db, target.id, Some(7), true, &[weight(mine.id, 10)]).await?;
        let result = update_auto_balance_config(
            &db,
            target.id,
            Some(7),
            true,
            &[weight(theirs.id, 10)],
        )
        .await;
        assert!(matches!(
            result,
            Err(Error::BudgetNotFound { budget_id }) if budget_id == theirs.id
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_budget() -> Result<()> {
        let db = setup_test_db().await?;
        let result = update_auto_balance_config(&db, 404, None, true, &[]).await;
        assert!(matches!(result, Err(Error::BudgetNotFound { budget_id: 404 })));

        let target = create_test_budget(&db, "Target", 10_000).await?;
        let result =
            update_auto_balance_config(&db, target.id, None, true, &[weight(405, 10)]).await;
        assert!(matches!(result, Err(Error::BudgetNotFound { budget_id: 405 })));
        assert!(matches!(
            get_auto_balance_config(&db, 404, None).await,
            Err(Error::BudgetNotFound { .. })
        ));
        Ok(())
    }
}
