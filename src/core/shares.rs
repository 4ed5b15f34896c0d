//! Share calculation - Who owes what, and whether the claims add up.
//!
//! [`calculate_shares`] is a pure function over a [`LedgerSnapshot`]; [`compute_shares`] only
//! loads the snapshot for a tab and hands it over. Nothing here writes to the store, and
//! imbalances are reported back rather than corrected.

use crate::{
    core::{expense, tab},
    entities::{Assignment, LineItem, assignment, expense as expense_entity, line_item, member},
    errors::Result,
};
use sea_orm::{QueryOrder, prelude::*};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Everything the calculator reads for one tab.
#[derive(Debug, Clone, Default)]
pub struct LedgerSnapshot {
    /// The tab's members
    pub members: Vec<member::Model>,
    /// The tab's expenses
    pub expenses: Vec<expense_entity::Model>,
    /// Line items of those expenses
    pub line_items: Vec<line_item::Model>,
    /// Assignments on those line items
    pub assignments: Vec<assignment::Model>,
}

/// Claim status of one line item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemShareStatus {
    /// The item
    pub line_item_id: i64,
    /// Its expense
    pub expense_id: i64,
    /// Item name, for display
    pub name: String,
    /// Item price including tax and tip
    pub total_price: f64,
    /// Sum of all shares claimed on it
    pub assigned_total: f64,
    /// Nobody has claimed anything of it
    pub unassigned: bool,
    /// Claims exceed the price by more than the tolerance
    pub over_assigned: bool,
}

/// Consistency of one expense's own money fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpenseTotalsCheck {
    /// The expense
    pub expense_id: i64,
    /// Recorded grand total
    pub total_amount: f64,
    /// `subtotal + tax + tip` matches `total` within tolerance
    pub totals_consistent: bool,
}

/// Outcome of comparing claimed shares with the recorded totals.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Reconciliation {
    /// Claims and totals agree within tolerance
    Balanced,
    /// Claims and totals differ; `difference` is `claimed - recorded`
    Unbalanced {
        /// Sum of every member's owed total
        claimed: f64,
        /// Sum of the expenses' recorded totals
        recorded: f64,
        /// `claimed - recorded`
        difference: f64,
    },
}

/// Per-member totals and per-item flags for a tab.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShareReport {
    /// Owed amount keyed by member id; every member appears, zero if they claimed nothing
    pub member_totals: BTreeMap<i64, f64>,
    /// Claim status of every line item
    pub items: Vec<ItemShareStatus>,
    /// Self-consistency of every expense
    pub expenses: Vec<ExpenseTotalsCheck>,
    /// Sum of `member_totals`
    pub claimed_total: f64,
    /// Sum of the expenses' `total_amount`
    pub recorded_total: f64,
    /// Whether the two sums agree
    pub reconciliation: Reconciliation,
}

impl ShareReport {
    /// Owed amount for one member; zero for unknown ids.
    #[must_use]
    pub fn owed_total(&self, member_id: i64) -> f64 {
        self.member_totals.get(&member_id).copied().unwrap_or(0.0)
    }

    /// Whether claims and recorded totals agree.
    #[must_use]
    pub const fn is_balanced(&self) -> bool {
        matches!(self.reconciliation, Reconciliation::Balanced)
    }

    /// Items nobody has claimed.
    pub fn unassigned_items(&self) -> impl Iterator<Item = &ItemShareStatus> {
        self.items.iter().filter(|i| i.unassigned)
    }

    /// Items claimed beyond their price.
    pub fn over_assigned_items(&self) -> impl Iterator<Item = &ItemShareStatus> {
        self.items.iter().filter(|i| i.over_assigned)
    }
}

/// Derives owed totals, item flags, and the reconciliation outcome from a snapshot.
#[must_use]
pub fn calculate_shares(snapshot: &LedgerSnapshot, tolerance: f64) -> ShareReport {
    let mut member_totals: BTreeMap<i64, f64> =
        snapshot.members.iter().map(|m| (m.id, 0.0)).collect();
    let mut assigned_by_item: HashMap<i64, f64> = HashMap::new();

    for a in &snapshot.assignments {
        *member_totals.entry(a.member_id).or_insert(0.0) += a.share_amount;
        *assigned_by_item.entry(a.line_item_id).or_insert(0.0) += a.share_amount;
    }

    let items = snapshot
        .line_items
        .iter()
        .map(|item| {
            let assigned_total = assigned_by_item.get(&item.id).copied().unwrap_or(0.0);
            ItemShareStatus {
                line_item_id: item.id,
                expense_id: item.expense_id,
                name: item.name.clone(),
                total_price: item.total_price,
                assigned_total,
                unassigned: assigned_total.abs() < f64::EPSILON,
                over_assigned: assigned_total > item.total_price + tolerance,
            }
        })
        .collect();

    let expenses = snapshot
        .expenses
        .iter()
        .map(|e| ExpenseTotalsCheck {
            expense_id: e.id,
            total_amount: e.total_amount,
            totals_consistent: e.totals_consistent(tolerance),
        })
        .collect();

    let claimed_total: f64 = member_totals.values().sum();
    let recorded_total: f64 = snapshot.expenses.iter().map(|e| e.total_amount).sum();
    let difference = claimed_total - recorded_total;
    let reconciliation = if difference.abs() <= tolerance {
        Reconciliation::Balanced
    } else {
        Reconciliation::Unbalanced {
            claimed: claimed_total,
            recorded: recorded_total,
            difference,
        }
    };

    ShareReport {
        member_totals,
        items,
        expenses,
        claimed_total,
        recorded_total,
        reconciliation,
    }
}

/// Reads the current members, expenses, items, and assignments of a tab.
pub async fn load_snapshot<C>(db: &C, tab_id: i64) -> Result<LedgerSnapshot>
where
    C: ConnectionTrait,
{
    let members = tab::get_members_for_tab(db, tab_id).await?;
    let expenses = expense::get_expenses_for_tab(db, tab_id).await?;
    let expense_ids: Vec<i64> = expenses.iter().map(|e| e.id).collect();

    let line_items = LineItem::find()
        .filter(line_item::Column::ExpenseId.is_in(expense_ids))
        .order_by_asc(line_item::Column::Id)
        .all(db)
        .await?;
    let item_ids: Vec<i64> = line_items.iter().map(|i| i.id).collect();

    let assignments = Assignment::find()
        .filter(assignment::Column::LineItemId.is_in(item_ids))
        .order_by_asc(assignment::Column::Id)
        .all(db)
        .await?;

    Ok(LedgerSnapshot {
        members,
        expenses,
        line_items,
        assignments,
    })
}

/// Computes the share report for a tab from its current state.
pub async fn compute_shares<C>(db: &C, tab_id: i64, tolerance: f64) -> Result<ShareReport>
where
    C: ConnectionTrait,
{
    let snapshot = load_snapshot(db, tab_id).await?;
    Ok(calculate_shares(&snapshot, tolerance))
}
