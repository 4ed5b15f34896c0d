//! Assignment business logic - Members claiming and releasing line items.
//!
//! A line item may carry any number of assignments, one per member. Claiming an item twice
//! replaces the earlier share; the `(line_item_id, member_id)` unique index makes the
//! replacement an `INSERT .. ON CONFLICT DO UPDATE`, so concurrent claims on the same pair
//! collapse into one row with the last written share.
//!
//! Claims are not capped at the item price. Over-assignment is reported by
//! [`crate::core::shares`] instead of being rejected here.

use crate::{
    core::expense::get_expense_for_line_item,
    entities::{Assignment, Member, assignment, member},
    errors::{Error, Result, is_foreign_key_violation},
};
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*, sea_query::OnConflict};
use tracing::{debug, info};

fn validate_share(share_amount: f64) -> Result<()> {
    if !share_amount.is_finite() || share_amount < 0.0 {
        return Err(Error::validation(format!(
            "Share amount must be a non-negative number, got {share_amount}"
        )));
    }
    Ok(())
}

/// An item deleted between the lookup and the write surfaces as a foreign-key violation.
fn claim_write_error(err: DbErr, line_item_id: i64) -> Error {
    if is_foreign_key_violation(&err) {
        Error::not_found("Line item", line_item_id)
    } else {
        err.into()
    }
}

/// Claims a line item for a member, or replaces the member's existing share of it.
///
/// # Errors
/// - [`Error::Validation`] if the share is negative or not finite
/// - [`Error::NotFound`] if the line item or member does not exist
/// - [`Error::Forbidden`] if the member belongs to a different tab than the item
pub async fn assign(
    db: &DatabaseConnection,
    member_id: i64,
    line_item_id: i64,
    share_amount: f64,
) -> Result<assignment::Model> {
    validate_share(share_amount)?;

    let txn = db.begin().await?;

    let (_item, expense) = get_expense_for_line_item(&txn, line_item_id).await?;
    let member = Member::find_by_id(member_id)
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("Member", member_id))?;
    if member.tab_id != expense.tab_id {
        return Err(Error::forbidden("Only members of this tab can claim its items"));
    }

    let row = assignment::ActiveModel {
        line_item_id: Set(line_item_id),
        member_id: Set(member_id),
        share_amount: Set(share_amount),
        created_at: Set(chrono::Utc::now()),
        ..Default::default()
    };
    Assignment::insert(row)
        .on_conflict(
            OnConflict::columns([
                assignment::Column::LineItemId,
                assignment::Column::MemberId,
            ])
            .update_column(assignment::Column::ShareAmount)
            .to_owned(),
        )
        .exec_without_returning(&txn)
        .await
        .map_err(|e| claim_write_error(e, line_item_id))?;

    let stored = find_assignment(&txn, member_id, line_item_id)
        .await?
        .ok_or_else(|| Error::not_found("Line item", line_item_id))?;
    txn.commit().await?;

    debug!(
        "Member {} claims {:.2} of line item {}",
        member_id, share_amount, line_item_id
    );
    Ok(stored)
}

/// Releases a member's own claim on a line item.
///
/// # Errors
/// - [`Error::NotFound`] if the line item does not exist, or nobody has claimed it
/// - [`Error::Forbidden`] if the item is claimed only by other members
pub async fn unassign(db: &DatabaseConnection, member_id: i64, line_item_id: i64) -> Result<()> {
    let txn = db.begin().await?;

    get_expense_for_line_item(&txn, line_item_id).await?;

    if let Some(own) = find_assignment(&txn, member_id, line_item_id).await? {
        own.delete(&txn).await?;
        txn.commit().await?;
        info!("Member {} released line item {}", member_id, line_item_id);
        return Ok(());
    }

    let claimed_by_others = !get_assignments_for_item(&txn, line_item_id)
        .await?
        .is_empty();
    if claimed_by_others {
        return Err(Error::forbidden("You can only remove your own claim on an item"));
    }
    Err(Error::not_found("Assignment", line_item_id))
}

/// Finds the assignment for one `(member, line item)` pair.
pub async fn find_assignment<C>(
    db: &C,
    member_id: i64,
    line_item_id: i64,
) -> Result<Option<assignment::Model>>
where
    C: ConnectionTrait,
{
    Assignment::find()
        .filter(assignment::Column::MemberId.eq(member_id))
        .filter(assignment::Column::LineItemId.eq(line_item_id))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Lists every claim on a line item, oldest first.
pub async fn get_assignments_for_item<C>(
    db: &C,
    line_item_id: i64,
) -> Result<Vec<assignment::Model>>
where
    C: ConnectionTrait,
{
    Assignment::find()
        .filter(assignment::Column::LineItemId.eq(line_item_id))
        .order_by_asc(assignment::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Lists every claim a member holds, oldest first.
pub async fn get_assignments_for_member<C>(
    db: &C,
    member_id: i64,
) -> Result<Vec<assignment::Model>>
where
    C: ConnectionTrait,
{
    Assignment::find()
        .filter(assignment::Column::MemberId.eq(member_id))
        .order_by_asc(assignment::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// The member row behind an assignment.
pub async fn get_assignment_member<C>(
    db: &C,
    assignment: &assignment::Model,
) -> Result<member::Model>
where
    C: ConnectionTrait,
{
    Member::find_by_id(assignment.member_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("Member", assignment.member_id))
}
