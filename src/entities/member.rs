//! Member entity - A (tab, person) pairing with a role.
//!
//! `(tab_id, user_id)` is unique: a person joins a given tab at most once.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Role of a member within a tab
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    /// The creator of the tab
    #[sea_orm(string_value = "owner")]
    Owner,
    /// Anyone who joined afterwards
    #[sea_orm(string_value = "member")]
    Member,
}

/// Member database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tab_members")]
pub struct Model {
    /// Unique identifier for the membership
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Tab this membership belongs to
    pub tab_id: i64,
    /// User id of the person
    pub user_id: String,
    /// Owner or plain member
    pub role: MemberRole,
    /// When the person joined
    pub joined_at: DateTimeUtc,
}

/// Defines relationships between Member and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each member belongs to one tab
    #[sea_orm(
        belongs_to = "super::tab::Entity",
        from = "Column::TabId",
        to = "super::tab::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Tab,
    /// One member has many assignments
    #[sea_orm(has_many = "super::assignment::Entity")]
    Assignments,
}

impl Related<super::tab::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tab.def()
    }
}

impl Related<super::assignment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Assignments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
