//! Shared test utilities for `tabsplit`.
//!
//! Helpers for setting up in-memory stores and seeding tabs, expenses, and items with
//! sensible defaults.

use crate::{
    config::{LedgerSettings, database},
    core::{
        expense::{self, ExpenseWithItems},
        ledger::Ledger,
        receipt::{NormalizedLineItem, NormalizedReceipt},
        tab,
    },
    entities,
    errors::Result,
};
use sea_orm::DatabaseConnection;

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    database::create_tables(&db).await?;
    Ok(db)
}

/// Routes `tracing` output through the test harness. Safe to call from every test.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("tabsplit=debug")
        .with_test_writer()
        .try_init();
}

/// A [`Ledger`] over a fresh store with default rules.
pub async fn setup_test_ledger() -> Result<Ledger> {
    init_test_tracing();
    Ok(Ledger::new(setup_test_db().await?, LedgerSettings::default()))
}

/// Sets up a store holding one tab named "Test Tab" owned by `alice`.
pub async fn setup_with_tab() -> Result<(DatabaseConnection, entities::tab::Model)> {
    let db = setup_test_db().await?;
    let tab = tab::create_tab(&db, "Test Tab", None, "alice").await?;
    Ok((db, tab))
}

/// Records an expense with one single-quantity line item per `(name, price)` pair.
///
/// # Defaults
/// * `place_name`: "Test Place"
/// * `subtotal` and `total_amount`: sum of the prices
/// * tax and tip: 0.0
pub async fn create_test_expense(
    db: &DatabaseConnection,
    tab_id: i64,
    created_by: &str,
    items: &[(&str, f64)],
) -> Result<ExpenseWithItems> {
    let total: f64 = items.iter().map(|(_, price)| price).sum();
    let receipt = NormalizedReceipt {
        place_name: "Test Place".to_string(),
        subtotal: total,
        tax_amount: 0.0,
        tip_amount: 0.0,
        total_amount: total,
        items: items
            .iter()
            .map(|(name, price)| NormalizedLineItem {
                name: (*name).to_string(),
                description: String::new(),
                quantity: 1,
                unit_price: *price,
                total_price: *price,
            })
            .collect(),
    };
    expense::create_expense(db, tab_id, created_by, &receipt).await
}

/// Sets up a tab with one expense holding a single item at `price`.
/// Returns (db, tab, owner membership, item) for assignment tests.
pub async fn setup_with_item(
    price: f64,
) -> Result<(
    DatabaseConnection,
    entities::tab::Model,
    entities::member::Model,
    entities::line_item::Model,
)> {
    let (db, tab) = setup_with_tab().await?;
    let owner = tab::get_member(&db, tab.id, "alice")
        .await?
        .ok_or_else(|| crate::errors::Error::not_found("Member", "alice"))?;
    let mut created = create_test_expense(&db, tab.id, "alice", &[("Test Item", price)]).await?;
    let item = created
        .items
        .pop()
        .ok_or_else(|| crate::errors::Error::not_found("Line item", "Test Item"))?;
    Ok((db, tab, owner, item))
}
