//! Database configuration module for `TabSplit`.
//!
//! This module handles the `SQLite` connection and table creation using `SeaORM`.
//! Tables are generated from the entity definitions with `Schema::create_table_from_entity`,
//! so the schema always matches the Rust structs, including the cascading foreign keys
//! declared on each `belongs_to` relation. The composite unique indexes that the ledger
//! relies on for its duplicate-claim rules are created here as well.

use crate::config::settings::DatabaseSettings;
use crate::entities::{
    Assignment, AssignmentColumn, Expense, Invitation, LineItem, Member, MemberColumn, Profile,
    Tab,
};
use crate::errors::Result;
use sea_orm::sea_query::{Index, IndexCreateStatement};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, EntityTrait, Schema};
use tracing::{debug, info};

/// Default database location when neither `DATABASE_URL` nor `config.toml` provide one.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/tabsplit.sqlite?mode=rwc";

/// Resolves the database URL: `DATABASE_URL` wins, then the configured value, then the default.
#[must_use]
pub fn get_database_url(settings: &DatabaseSettings) -> String {
    std::env::var("DATABASE_URL")
        .ok()
        .or_else(|| settings.url.clone())
        .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string())
}

/// Establishes a connection to the database described by `settings`.
///
/// The returned handle is owned by the caller and passed explicitly to the ledger.
pub async fn create_connection(settings: &DatabaseSettings) -> Result<DatabaseConnection> {
    let database_url = get_database_url(settings);
    debug!("Connecting to database at {}", database_url);
    Database::connect(&database_url).await.map_err(Into::into)
}

/// Creates all ledger tables and unique indexes if they do not exist yet.
///
/// Parents come before children so the foreign keys resolve.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    // SQLite only enforces the cascades when this is on for the connection.
    db.execute_unprepared("PRAGMA foreign_keys = ON;").await?;

    let tables = [
        schema.create_table_from_entity(Profile),
        schema.create_table_from_entity(Tab),
        schema.create_table_from_entity(Member),
        schema.create_table_from_entity(Invitation),
        schema.create_table_from_entity(Expense),
        schema.create_table_from_entity(LineItem),
        schema.create_table_from_entity(Assignment),
    ];
    for mut table in tables {
        table.if_not_exists();
        db.execute(builder.build(&table)).await?;
    }

    let indexes = [
        unique_index(
            "idx_tab_members_tab_user",
            Member,
            &[MemberColumn::TabId, MemberColumn::UserId],
        ),
        unique_index(
            "idx_item_assignments_item_member",
            Assignment,
            &[AssignmentColumn::LineItemId, AssignmentColumn::MemberId],
        ),
    ];
    for index in &indexes {
        db.execute(builder.build(index)).await?;
    }

    info!("Ledger tables and unique indexes ensured.");
    Ok(())
}

fn unique_index<E>(name: &str, entity: E, columns: &[E::Column]) -> IndexCreateStatement
where
    E: EntityTrait,
{
    let mut index = Index::create();
    index.name(name).table(entity).unique().if_not_exists();
    for column in columns {
        index.col(*column);
    }
    index
}
