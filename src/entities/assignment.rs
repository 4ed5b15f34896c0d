//! Assignment entity - A claim by one member on one line item.
//!
//! `(line_item_id, member_id)` is unique, so re-claiming replaces the share instead of adding
//! a row.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Assignment database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "item_assignments")]
pub struct Model {
    /// Unique identifier for the assignment
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Claimed line item
    pub line_item_id: i64,
    /// Claiming member
    pub member_id: i64,
    /// Amount this member owes for the item
    pub share_amount: f64,
    /// When the claim was first made
    pub created_at: DateTimeUtc,
}

/// Defines relationships between Assignment and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each assignment belongs to one line item
    #[sea_orm(
        belongs_to = "super::line_item::Entity",
        from = "Column::LineItemId",
        to = "super::line_item::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    LineItem,
    /// Each assignment belongs to one member
    #[sea_orm(
        belongs_to = "super::member::Entity",
        from = "Column::MemberId",
        to = "super::member::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Member,
}

impl Related<super::line_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LineItem.def()
    }
}

impl Related<super::member::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Member.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
