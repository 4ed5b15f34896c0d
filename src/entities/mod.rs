//! Entity module - Contains all SeaORM entity definitions for the database.
//! These entities represent the database tables and their relationships.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod assignment;
pub mod expense;
pub mod invitation;
pub mod line_item;
pub mod member;
pub mod profile;
pub mod tab;

// Re-export specific types to avoid conflicts
pub use assignment::{
    Column as AssignmentColumn, Entity as Assignment, Model as AssignmentModel,
};
pub use expense::{Column as ExpenseColumn, Entity as Expense, Model as ExpenseModel};
pub use invitation::{
    Column as InvitationColumn, Entity as Invitation, InvitationStatus, Model as InvitationModel,
};
pub use line_item::{Column as LineItemColumn, Entity as LineItem, Model as LineItemModel};
pub use member::{Column as MemberColumn, Entity as Member, MemberRole, Model as MemberModel};
pub use profile::{Column as ProfileColumn, Entity as Profile, Model as ProfileModel};
pub use tab::{Column as TabColumn, Entity as Tab, Model as TabModel, TabStatus};
