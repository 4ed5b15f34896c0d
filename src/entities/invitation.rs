//! Invitation entity - A pending offer to join a tab by email.
//!
//! The token is single-use: an invitation leaves `pending` exactly once.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Lifecycle status of an invitation
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "lowercase")]
pub enum InvitationStatus {
    /// Waiting for a response
    #[sea_orm(string_value = "pending")]
    Pending,
    /// Consumed; the invitee became a member
    #[sea_orm(string_value = "accepted")]
    Accepted,
    /// Refused by the invitee
    #[sea_orm(string_value = "declined")]
    Declined,
    /// Left unanswered past its lifetime
    #[sea_orm(string_value = "expired")]
    Expired,
}

/// Invitation database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tab_invitations")]
pub struct Model {
    /// Unique identifier for the invitation
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Tab the invitee would join
    pub tab_id: i64,
    /// Invitee email, lowercased
    pub email: String,
    /// User id of the member who sent it
    pub invited_by: String,
    /// When it was sent
    pub invited_at: DateTimeUtc,
    /// Current status
    pub status: InvitationStatus,
    /// Single-use token
    #[sea_orm(unique)]
    pub token: String,
    /// When it left `pending`, if it has
    pub responded_at: Option<DateTimeUtc>,
}

/// Defines relationships between Invitation and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each invitation belongs to one tab
    #[sea_orm(
        belongs_to = "super::tab::Entity",
        from = "Column::TabId",
        to = "super::tab::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Tab,
}

impl Related<super::tab::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tab.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
