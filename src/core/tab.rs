//! Tab business logic - Tabs, their members, and the cached tab total.
//!
//! These are the unguarded store operations; permission checks live in
//! [`crate::core::access`] and are applied by [`crate::core::ledger::Ledger`].

use crate::{
    core::profile,
    entities::{
        Assignment, Expense, LineItem, Member, MemberRole, Tab, TabStatus, assignment, expense,
        line_item, member, profile as profile_entity, tab,
    },
    errors::{Error, Result, is_unique_violation},
};
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*, sea_query::Expr};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info};

/// Longest tab name accepted, in characters.
pub const MAX_TAB_NAME_LEN: usize = 100;
/// Longest tab description accepted, in characters.
pub const MAX_TAB_DESCRIPTION_LEN: usize = 500;

/// A tab as listed for one of its members.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TabSummary {
    /// The tab itself
    pub tab: tab::Model,
    /// Number of members in the tab
    pub member_count: usize,
    /// The listing user's role in it
    pub user_role: MemberRole,
}

/// A member together with their profile, if one is known.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemberProfile {
    /// Membership row
    pub member: member::Model,
    /// Display information
    pub profile: Option<profile_entity::Model>,
}

/// A line item with every claim on it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineItemDetail {
    /// The item
    pub item: line_item::Model,
    /// Its assignments, oldest first
    pub assignments: Vec<assignment::Model>,
}

/// An expense with its items.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpenseDetail {
    /// The expense
    pub expense: expense::Model,
    /// Its line items, in insertion order
    pub items: Vec<LineItemDetail>,
}

/// Everything a member may see about a tab.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TabDetail {
    /// The tab
    pub tab: tab::Model,
    /// Members with profiles, in join order
    pub members: Vec<MemberProfile>,
    /// Expenses, newest first
    pub expenses: Vec<ExpenseDetail>,
}

/// Checks and trims tab input.
///
/// Length limits apply to the text as submitted; the stored name is trimmed and a blank
/// description is stored as `None`.
pub fn validate_tab_input(
    name: &str,
    description: Option<&str>,
) -> Result<(String, Option<String>)> {
    if name.trim().is_empty() {
        return Err(Error::validation("Tab name is required"));
    }
    if name.chars().count() > MAX_TAB_NAME_LEN {
        return Err(Error::validation(format!(
            "Tab name must be {MAX_TAB_NAME_LEN} characters or less"
        )));
    }
    if description.is_some_and(|d| d.chars().count() > MAX_TAB_DESCRIPTION_LEN) {
        return Err(Error::validation(format!(
            "Description must be {MAX_TAB_DESCRIPTION_LEN} characters or less"
        )));
    }
    let description = description
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(ToString::to_string);
    Ok((name.trim().to_string(), description))
}

/// Creates a tab and makes its creator the owner, as one transaction.
///
/// # Errors
/// Returns [`Error::Validation`] for an empty or overlong name or an overlong description.
pub async fn create_tab(
    db: &DatabaseConnection,
    name: &str,
    description: Option<&str>,
    creator: &str,
) -> Result<tab::Model> {
    let (name, description) = validate_tab_input(name, description)?;
    if creator.trim().is_empty() {
        return Err(Error::validation("Tab creator is required"));
    }

    let txn = db.begin().await?;

    let now = chrono::Utc::now();
    let tab = tab::ActiveModel {
        name: Set(name),
        description: Set(description),
        created_by: Set(creator.to_string()),
        status: Set(TabStatus::Active),
        total_amount: Set(0.0),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    add_member(&txn, tab.id, creator, MemberRole::Owner).await?;

    txn.commit().await?;
    info!("Created tab {} ({}) owned by {}", tab.id, tab.name, creator);
    Ok(tab)
}

/// Adds a person to a tab.
///
/// # Errors
/// - [`Error::NotFound`] if the tab does not exist
/// - [`Error::AlreadyMember`] if the person already belongs to the tab
pub async fn add_member<C>(
    db: &C,
    tab_id: i64,
    user_id: &str,
    role: MemberRole,
) -> Result<member::Model>
where
    C: ConnectionTrait,
{
    if user_id.trim().is_empty() {
        return Err(Error::validation("Member user id is required"));
    }

    Tab::find_by_id(tab_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("Tab", tab_id))?;

    let already_member = || Error::AlreadyMember {
        tab_id,
        user_id: user_id.to_string(),
    };

    if get_member(db, tab_id, user_id).await?.is_some() {
        return Err(already_member());
    }

    // The unique index settles two joins racing past the check above.
    let member = member::ActiveModel {
        tab_id: Set(tab_id),
        user_id: Set(user_id.to_string()),
        role: Set(role),
        joined_at: Set(chrono::Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            already_member()
        } else {
            e.into()
        }
    })?;

    debug!("Added {} to tab {} as {:?}", user_id, tab_id, role);
    Ok(member)
}

/// Finds a tab by its ID.
pub async fn get_tab_by_id<C>(db: &C, tab_id: i64) -> Result<Option<tab::Model>>
where
    C: ConnectionTrait,
{
    Tab::find_by_id(tab_id).one(db).await.map_err(Into::into)
}

/// Finds the membership of `user_id` in a tab.
pub async fn get_member<C>(db: &C, tab_id: i64, user_id: &str) -> Result<Option<member::Model>>
where
    C: ConnectionTrait,
{
    Member::find()
        .filter(member::Column::TabId.eq(tab_id))
        .filter(member::Column::UserId.eq(user_id))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Lists a tab's members in join order.
pub async fn get_members_for_tab<C>(db: &C, tab_id: i64) -> Result<Vec<member::Model>>
where
    C: ConnectionTrait,
{
    Member::find()
        .filter(member::Column::TabId.eq(tab_id))
        .order_by_asc(member::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Lists the tabs a user belongs to, newest first.
pub async fn list_tabs_for_user(db: &DatabaseConnection, user_id: &str) -> Result<Vec<TabSummary>> {
    let memberships = Member::find()
        .filter(member::Column::UserId.eq(user_id))
        .all(db)
        .await?;
    if memberships.is_empty() {
        return Ok(Vec::new());
    }

    let roles: HashMap<i64, MemberRole> = memberships.iter().map(|m| (m.tab_id, m.role)).collect();
    let tab_ids: Vec<i64> = roles.keys().copied().collect();

    let tabs = Tab::find()
        .filter(tab::Column::Id.is_in(tab_ids.clone()))
        .order_by_desc(tab::Column::CreatedAt)
        .order_by_desc(tab::Column::Id)
        .all(db)
        .await?;

    let mut counts: HashMap<i64, usize> = HashMap::new();
    for m in Member::find()
        .filter(member::Column::TabId.is_in(tab_ids))
        .all(db)
        .await?
    {
        *counts.entry(m.tab_id).or_default() += 1;
    }

    Ok(tabs
        .into_iter()
        .map(|tab| TabSummary {
            member_count: counts.get(&tab.id).copied().unwrap_or_default(),
            user_role: roles.get(&tab.id).copied().unwrap_or(MemberRole::Member),
            tab,
        })
        .collect())
}

/// Moves a tab to a new lifecycle status.
pub async fn set_tab_status(
    db: &DatabaseConnection,
    tab_id: i64,
    status: TabStatus,
) -> Result<tab::Model> {
    let tab = get_tab_by_id(db, tab_id)
        .await?
        .ok_or_else(|| Error::not_found("Tab", tab_id))?;

    let mut active: tab::ActiveModel = tab.into();
    active.status = Set(status);
    active.updated_at = Set(chrono::Utc::now());
    let updated = active.update(db).await?;
    info!("Tab {} is now {:?}", tab_id, status);
    Ok(updated)
}

/// Recomputes the cached `total_amount` from the tab's expenses.
///
/// Callers run this inside the same transaction as the write that changed the expenses.
pub async fn refresh_tab_total<C>(db: &C, tab_id: i64) -> Result<f64>
where
    C: ConnectionTrait,
{
    let total: f64 = Expense::find()
        .filter(expense::Column::TabId.eq(tab_id))
        .all(db)
        .await?
        .iter()
        .map(|e| e.total_amount)
        .sum();

    Tab::update_many()
        .col_expr(tab::Column::TotalAmount, Expr::value(total))
        .col_expr(tab::Column::UpdatedAt, Expr::value(chrono::Utc::now()))
        .filter(tab::Column::Id.eq(tab_id))
        .exec(db)
        .await?;

    debug!("Tab {} total refreshed to {:.2}", tab_id, total);
    Ok(total)
}

/// Loads the full member-visible view of a tab.
pub async fn load_tab_detail(db: &DatabaseConnection, tab: tab::Model) -> Result<TabDetail> {
    let members = get_members_for_tab(db, tab.id).await?;
    let user_ids: Vec<String> = members.iter().map(|m| m.user_id.clone()).collect();
    let mut profiles: HashMap<String, profile_entity::Model> =
        profile::get_profiles_by_ids(db, &user_ids)
            .await?
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect();
    let members = members
        .into_iter()
        .map(|member| MemberProfile {
            profile: profiles.remove(&member.user_id),
            member,
        })
        .collect();

    let expenses = Expense::find()
        .filter(expense::Column::TabId.eq(tab.id))
        .order_by_desc(expense::Column::CreatedAt)
        .order_by_desc(expense::Column::Id)
        .all(db)
        .await?;
    let expense_ids: Vec<i64> = expenses.iter().map(|e| e.id).collect();

    let items = LineItem::find()
        .filter(line_item::Column::ExpenseId.is_in(expense_ids))
        .order_by_asc(line_item::Column::Id)
        .all(db)
        .await?;
    let item_ids: Vec<i64> = items.iter().map(|i| i.id).collect();

    let mut assignments_by_item: HashMap<i64, Vec<assignment::Model>> = HashMap::new();
    for a in Assignment::find()
        .filter(assignment::Column::LineItemId.is_in(item_ids))
        .order_by_asc(assignment::Column::Id)
        .all(db)
        .await?
    {
        assignments_by_item.entry(a.line_item_id).or_default().push(a);
    }

    let mut items_by_expense: HashMap<i64, Vec<LineItemDetail>> = HashMap::new();
    for item in items {
        let assignments = assignments_by_item.remove(&item.id).unwrap_or_default();
        items_by_expense
            .entry(item.expense_id)
            .or_default()
            .push(LineItemDetail { item, assignments });
    }

    let expenses = expenses
        .into_iter()
        .map(|expense| ExpenseDetail {
            items: items_by_expense.remove(&expense.id).unwrap_or_default(),
            expense,
        })
        .collect();

    Ok(TabDetail {
        tab,
        members,
        expenses,
    })
}
