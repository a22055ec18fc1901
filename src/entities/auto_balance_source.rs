//! Auto-balance source entity - a weighted edge from a target budget to a
//! budget it may draw from when in deficit.
//!
//! The composite primary key allows at most one edge per (target, source).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Auto-balance source database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "budget_auto_balance_sources")]
pub struct Model {
    /// Budget that receives the transfer
    #[sea_orm(primary_key, auto_increment = false)]
    pub budget_id: i64,
    /// Budget that is debited
    #[sea_orm(primary_key, auto_increment = false)]
    pub source_budget_id: i64,
    /// Share of the deficit, 0 to 100
    pub weight: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// The budget being topped up
    #[sea_orm(
        belongs_to = "super::budget::Entity",
        from = "Column::BudgetId",
        to = "super::budget::Column::Id"
    )]
    Target,
    /// The budget funds are drawn from
    #[sea_orm(
        belongs_to = "super::budget::Entity",
        from = "Column::SourceBudgetId",
        to = "super::budget::Column::Id"
    )]
    Source,
}

impl ActiveModelBehavior for ActiveModel {}
