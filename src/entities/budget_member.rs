//! Budget member entity - which users may act on which budgets.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Budget member database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "budget_members")]
pub struct Model {
    /// Budget the user may act on
    #[sea_orm(primary_key, auto_increment = false)]
    pub budget_id: i64,
    /// Member user id
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: i64,
}

/// Defines relationships between BudgetMember and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each membership belongs to one budget
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
