//! Budget entity - a named pot of money with an optional monthly payroll.
//!
//! The balance is never stored; it is derived from the budget's ledger entries.
//! `payroll_run_at` is the run marker stamped by the payroll engine.

use crate::money::Money;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Budget database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "budgets")]
pub struct Model {
    /// Unique identifier for the budget
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Human-readable name (e.g., "Groceries")
    pub name: String,
    /// Amount credited once per calendar month; zero disables payroll
    pub payroll: Money,
    /// When payroll was last applied, None if never
    pub payroll_run_at: Option<DateTimeUtc>,
    /// Whether a deficit is topped up from weighted sources before payroll
    pub auto_balance_enabled: bool,
    /// When the budget was created
    pub created_at: DateTimeUtc,
    /// When the budget was last modified
    pub updated_at: DateTimeUtc,
}

/// Defines relationships between Budget and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One budget has many ledger entries
    #[sea_orm(has_many = "super::ledger_entry::Entity")]
    LedgerEntries,
    /// One budget has many members
    #[sea_orm(has_many = "super::budget_member::Entity")]
    Members,
}

impl Related<super::ledger_entry::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LedgerEntries.def()
    }
}

impl Related<super::budget_member::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Members.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
