//! Line item entity - One atomic, single-quantity priced unit within an expense.
//!
//! `quantity` is always 1; multi-quantity receipt rows are exploded before they reach this table.
//! `unit_price` is the listed price, `total_price` includes the item's share of tax and tip.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Line item database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "expense_items")]
pub struct Model {
    /// Unique identifier for the line item
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Expense this item belongs to
    pub expense_id: i64,
    /// Item name
    pub name: String,
    /// Extra detail, empty when none
    pub description: String,
    /// Always 1
    pub quantity: i32,
    /// Listed price of one unit
    pub unit_price: f64,
    /// Tax/tip-adjusted cost of one unit
    pub total_price: f64,
    /// When the item was recorded
    pub created_at: DateTimeUtc,
}

/// Defines relationships between `LineItem` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each line item belongs to one expense
    #[sea_orm(
        belongs_to = "super::expense::Entity",
        from = "Column::ExpenseId",
        to = "super::expense::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Expense,
    /// One line item has many assignments
    #[sea_orm(has_many = "super::assignment::Entity")]
    Assignments,
}

impl Related<super::expense::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Expense.def()
    }
}

impl Related<super::assignment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Assignments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
