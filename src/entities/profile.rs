//! Profile entity - Display information for a person known to the identity provider.
//!
//! Profiles are keyed by the opaque user id the session provider hands out.
//! They carry no credentials; only what the full tab view shows about members.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Profile database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "profiles")]
pub struct Model {
    /// User id issued by the identity provider
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    /// Contact email, lowercased
    pub email: String,
    /// Optional friendly name
    pub display_name: Option<String>,
    /// When the profile was first seen
    pub created_at: DateTimeUtc,
    /// When the profile was last changed
    pub updated_at: DateTimeUtc,
}

/// Profiles are referenced by user id only; there is no foreign key.
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
