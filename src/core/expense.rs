//! Expense business logic - Recording receipts and removing them again.
//!
//! An expense and its line items are written in one database transaction, and so is the
//! cascade that removes an expense together with its items and their assignments. If any
//! step fails the transaction is dropped before commit and nothing is left behind.

use crate::{
    core::{receipt::NormalizedReceipt, tab::refresh_tab_total},
    entities::{Assignment, Expense, LineItem, Tab, assignment, expense, line_item},
    errors::{Error, Result},
};
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use serde::Serialize;
use tracing::{error, info};

/// An expense as stored, with the line items created for it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpenseWithItems {
    /// The stored expense
    pub expense: expense::Model,
    /// Its line items, in receipt order
    pub items: Vec<line_item::Model>,
}

/// What a cascading expense delete removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeletedExpense {
    /// The removed expense
    pub expense_id: i64,
    /// Line items removed with it
    pub line_items: u64,
    /// Assignments removed with those items
    pub assignments: u64,
}

/// Stores a normalized receipt as an expense of `tab_id`, items included, atomically.
///
/// # Errors
/// - [`Error::NotFound`] if the tab does not exist
/// - [`Error::Persistence`] if any write fails; no expense or item remains in that case
pub async fn create_expense(
    db: &DatabaseConnection,
    tab_id: i64,
    created_by: &str,
    receipt: &NormalizedReceipt,
) -> Result<ExpenseWithItems> {
    let txn = db.begin().await?;

    Tab::find_by_id(tab_id)
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("Tab", tab_id))?;

    let now = chrono::Utc::now();
    let expense = expense::ActiveModel {
        tab_id: Set(tab_id),
        place_name: Set(receipt.place_name.clone()),
        created_by: Set(created_by.to_string()),
        subtotal: Set(receipt.subtotal),
        tax_amount: Set(receipt.tax_amount),
        tip_amount: Set(receipt.tip_amount),
        total_amount: Set(receipt.total_amount),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    if !receipt.items.is_empty() {
        let rows = receipt.items.iter().map(|item| line_item::ActiveModel {
            expense_id: Set(expense.id),
            name: Set(item.name.clone()),
            description: Set(item.description.clone()),
            quantity: Set(item.quantity),
            unit_price: Set(item.unit_price),
            total_price: Set(item.total_price),
            created_at: Set(now),
            ..Default::default()
        });
        // Dropping `txn` on this error rolls the expense insert back.
        LineItem::insert_many(rows)
            .exec_without_returning(&txn)
            .await
            .inspect_err(|e| {
                error!(
                    "Failed to add {} items to expense {}: {}",
                    receipt.items.len(),
                    expense.id,
                    e
                );
            })?;
    }

    refresh_tab_total(&txn, tab_id).await?;

    let items = get_line_items_for_expense(&txn, expense.id).await?;
    txn.commit().await?;

    info!(
        "Recorded expense {} at {} with {} line items in tab {}",
        expense.id,
        expense.place_name,
        items.len(),
        tab_id
    );
    Ok(ExpenseWithItems { expense, items })
}

/// Deletes an expense, its line items, and their assignments as one transaction.
///
/// # Errors
/// Returns [`Error::NotFound`] if the expense does not exist.
pub async fn delete_expense(db: &DatabaseConnection, expense_id: i64) -> Result<DeletedExpense> {
    let txn = db.begin().await?;

    let expense = Expense::find_by_id(expense_id)
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("Expense", expense_id))?;

    let item_ids: Vec<i64> = get_line_items_for_expense(&txn, expense_id)
        .await?
        .into_iter()
        .map(|item| item.id)
        .collect();

    let assignments = Assignment::delete_many()
        .filter(assignment::Column::LineItemId.is_in(item_ids))
        .exec(&txn)
        .await?
        .rows_affected;
    let line_items = LineItem::delete_many()
        .filter(line_item::Column::ExpenseId.eq(expense_id))
        .exec(&txn)
        .await?
        .rows_affected;
    Expense::delete_by_id(expense_id).exec(&txn).await?;

    refresh_tab_total(&txn, expense.tab_id).await?;
    txn.commit().await?;

    info!(
        "Deleted expense {} ({} items, {} assignments) from tab {}",
        expense_id, line_items, assignments, expense.tab_id
    );
    Ok(DeletedExpense {
        expense_id,
        line_items,
        assignments,
    })
}

/// Finds an expense by its ID.
pub async fn get_expense_by_id<C>(db: &C, expense_id: i64) -> Result<Option<expense::Model>>
where
    C: ConnectionTrait,
{
    Expense::find_by_id(expense_id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Lists a tab's expenses, oldest first.
pub async fn get_expenses_for_tab<C>(db: &C, tab_id: i64) -> Result<Vec<expense::Model>>
where
    C: ConnectionTrait,
{
    Expense::find()
        .filter(expense::Column::TabId.eq(tab_id))
        .order_by_asc(expense::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Lists an expense's line items in insertion order.
pub async fn get_line_items_for_expense<C>(
    db: &C,
    expense_id: i64,
) -> Result<Vec<line_item::Model>>
where
    C: ConnectionTrait,
{
    LineItem::find()
        .filter(line_item::Column::ExpenseId.eq(expense_id))
        .order_by_asc(line_item::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Finds a line item by its ID.
pub async fn get_line_item_by_id<C>(db: &C, line_item_id: i64) -> Result<Option<line_item::Model>>
where
    C: ConnectionTrait,
{
    LineItem::find_by_id(line_item_id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Resolves the expense that owns a line item.
///
/// # Errors
/// Returns [`Error::NotFound`] if the line item does not exist.
pub async fn get_expense_for_line_item<C>(
    db: &C,
    line_item_id: i64,
) -> Result<(line_item::Model, expense::Model)>
where
    C: ConnectionTrait,
{
    let item = get_line_item_by_id(db, line_item_id)
        .await?
        .ok_or_else(|| Error::not_found("Line item", line_item_id))?;
    let expense = get_expense_by_id(db, item.expense_id)
        .await?
        .ok_or_else(|| Error::not_found("Expense", item.expense_id))?;
    Ok((item, expense))
}
