//! Entity module - SeaORM definitions for the ledger tables.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod auto_balance_source;
pub mod budget;
pub mod budget_member;
pub mod ledger_entry;

// Re-export specific types to avoid conflicts
pub use auto_balance_source::{
    Column as AutoBalanceSourceColumn, Entity as AutoBalanceSource,
    Model as AutoBalanceSourceModel,
};
pub use budget::{Column as BudgetColumn, Entity as Budget, Model as BudgetModel};
pub use budget_member::{
    Column as BudgetMemberColumn, Entity as BudgetMember, Model as BudgetMemberModel,
};
pub use ledger_entry::{
    Column as LedgerEntryColumn, Direction, Entity as LedgerEntry, Model as LedgerEntryModel,
};
