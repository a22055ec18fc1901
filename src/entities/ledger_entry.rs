//! Ledger entry entity - an append-only credit or debit against one budget.
//!
//! System-generated entries (payroll, auto-balance) have no `actor_id`.
//! Amounts are always strictly positive; the direction lives in `credit`.

use crate::money::Money;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Ledger entry database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "ledger_entries")]
pub struct Model {
    /// Unique identifier for the entry
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Budget this entry belongs to
    pub budget_id: i64,
    /// User who created the entry, None for system entries
    pub actor_id: Option<i64>,
    /// Human-readable description (e.g., "Payroll March 2024")
    pub description: String,
    /// True for a credit, false for a debit
    pub credit: bool,
    /// Strictly positive amount
    pub amount: Money,
    /// When the entry was created
    pub created_at: DateTimeUtc,
    /// When the entry was last modified
    pub updated_at: DateTimeUtc,
}

impl Model {
    /// Direction of the entry as an enum.
    #[must_use]
    pub const fn direction(&self) -> Direction {
        Direction::from_credit_flag(self.credit)
    }

    /// Amount with its sign applied: positive for credits, negative for debits.
    #[must_use]
    pub fn signed_amount(&self) -> Money {
        match self.direction() {
            Direction::Credit => self.amount,
            Direction::Debit => -self.amount,
        }
    }
}

/// Whether an entry adds to or takes from a budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Adds to the balance
    Credit,
    /// Takes from the balance
    Debit,
}

impl Direction {
    /// Value stored in the `credit` column.
    #[must_use]
    pub const fn is_credit(self) -> bool {
        matches!(self, Self::Credit)
    }

    /// Inverse of [`Direction::is_credit`].
    #[must_use]
    pub const fn from_credit_flag(credit: bool) -> Self {
        if credit { Self::Credit } else { Self::Debit }
    }
}

/// Defines relationships between LedgerEntry and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each entry belongs to one budget
    #[sea_orm(
        belongs_to = "super::budget::Entity",
        from = "Column::BudgetId",
        to = "super::budget::Column::Id"
    )]
    Budget,
}

impl Related<super::budget::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Budget.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
