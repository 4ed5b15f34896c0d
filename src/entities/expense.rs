//! Expense entity - One real-world purchase attached to a tab.
//!
//! Carries the four money fields read off the receipt. The line items it owns
//! are removed with it.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Expense database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "expenses")]
pub struct Model {
    /// Unique identifier for the expense
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Tab this expense belongs to
    pub tab_id: i64,
    /// Merchant or place name
    pub place_name: String,
    /// User id of the member who recorded it
    pub created_by: String,
    /// Receipt subtotal
    pub subtotal: f64,
    /// Receipt tax
    pub tax_amount: f64,
    /// Receipt tip
    pub tip_amount: f64,
    /// Receipt grand total
    pub total_amount: f64,
    /// When the expense was recorded
    pub created_at: DateTimeUtc,
    /// When the expense was last modified
    pub updated_at: DateTimeUtc,
}

impl Model {
    /// Checks `subtotal + tax + tip` against `total` within `tolerance`.
    ///
    /// This is advisory: receipts are stored even when it does not hold.
    #[must_use]
    pub fn totals_consistent(&self, tolerance: f64) -> bool {
        let parts = self.subtotal + self.tax_amount + self.tip_amount;
        (parts - self.total_amount).abs() <= tolerance
    }
}

/// Defines relationships between Expense and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each expense belongs to one tab
    #[sea_orm(
        belongs_to = "super::tab::Entity",
        from = "Column::TabId",
        to = "super::tab::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Tab,
    /// One expense has many line items
    #[sea_orm(has_many = "super::line_item::Entity")]
    LineItems,
}

impl Related<super::tab::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tab.def()
    }
}

impl Related<super::line_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LineItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
