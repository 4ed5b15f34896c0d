//! Tab entity - A shared context for one group of people and its expenses.
//!
//! A tab owns its members, invitations and expenses; deleting a tab cascades to all of them.
//! `total_amount` is a cached aggregate of the tab's expense totals and is always recomputable.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a tab
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "lowercase")]
pub enum TabStatus {
    /// Open for new expenses and claims
    #[sea_orm(string_value = "active")]
    Active,
    /// Settled by the group
    #[sea_orm(string_value = "completed")]
    Completed,
    /// Hidden from day-to-day use
    #[sea_orm(string_value = "archived")]
    Archived,
}

/// Tab database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tabs")]
pub struct Model {
    /// Unique identifier for the tab
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Tab name (1-100 characters)
    pub name: String,
    /// Optional description (up to 500 characters)
    pub description: Option<String>,
    /// User id of the creator, who is also the owner
    pub created_by: String,
    /// Lifecycle status
    pub status: TabStatus,
    /// Cached sum of the tab's expense totals
    pub total_amount: f64,
    /// When the tab was created
    pub created_at: DateTimeUtc,
    /// When the tab was last modified
    pub updated_at: DateTimeUtc,
}

/// Defines relationships between Tab and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One tab has many members
    #[sea_orm(has_many = "super::member::Entity")]
    Members,
    /// One tab has many invitations
    #[sea_orm(has_many = "super::invitation::Entity")]
    Invitations,
    /// One tab has many expenses
    #[sea_orm(has_many = "super::expense::Entity")]
    Expenses,
}

impl Related<super::member::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Members.def()
    }
}

impl Related<super::invitation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Invitations.def()
    }
}

impl Related<super::expense::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Expenses.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
