//! Invitation business logic - Offering tab membership by email.
//!
//! An invitation starts `pending` and leaves that state exactly once: accepted, declined, or
//! expired. The transition is a conditional update on `status = 'pending'`, so two requests
//! racing to consume the same token cannot both succeed.

use crate::{
    core::{profile, tab},
    entities::{Invitation, InvitationStatus, MemberRole, invitation, member},
    errors::{Error, Result},
};
use chrono::{DateTime, Duration, Utc};
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*, sea_query::Expr};
use tracing::{debug, info};
use uuid::Uuid;

/// Longest email address accepted.
pub const MAX_EMAIL_LEN: usize = 254;

/// Trims, lowercases, and sanity-checks an email address.
pub fn normalize_email(email: &str) -> Result<String> {
    let email = email.trim().to_lowercase();
    if email.is_empty() {
        return Err(Error::validation("Email is required"));
    }
    if email.len() > MAX_EMAIL_LEN {
        return Err(Error::validation(format!(
            "Email must be {MAX_EMAIL_LEN} characters or less"
        )));
    }
    let valid = email.split_once('@').is_some_and(|(local, domain)| {
        !local.is_empty()
            && !domain.contains('@')
            && domain.contains('.')
            && !domain.starts_with('.')
            && !domain.ends_with('.')
    });
    if !valid || email.chars().any(char::is_whitespace) {
        return Err(Error::validation(format!("'{email}' is not a valid email")));
    }
    Ok(email)
}

/// Whether a pending invitation is past its lifetime at `now`.
#[must_use]
///
/// A lifetime too long to represent never expires.
pub fn is_expired(invitation: &invitation::Model, now: DateTime<Utc>, ttl_days: i64) -> bool {
    Duration::try_days(ttl_days)
        .and_then(|ttl| invitation.invited_at.checked_add_signed(ttl))
        .is_some_and(|expires_at| expires_at <= now)
}

/// Invites `email` to a tab on behalf of `invited_by`.
///
/// # Errors
/// - [`Error::Validation`] for an unusable email
/// - [`Error::NotFound`] if the tab does not exist
/// - [`Error::AlreadyMember`] if the email belongs to someone already in the tab
/// - [`Error::AlreadyExists`] if the email already has a pending invitation to the tab
pub async fn create_invitation(
    db: &DatabaseConnection,
    tab_id: i64,
    email: &str,
    invited_by: &str,
) -> Result<invitation::Model> {
    let email = normalize_email(email)?;

    let txn = db.begin().await?;

    tab::get_tab_by_id(&txn, tab_id)
        .await?
        .ok_or_else(|| Error::not_found("Tab", tab_id))?;

    let existing_profile = profile::find_profile_by_email(&txn, &email).await?;
    if let Some(existing) = existing_profile
        && tab::get_member(&txn, tab_id, &existing.id).await?.is_some()
    {
        return Err(Error::AlreadyMember {
            tab_id,
            user_id: existing.id,
        });
    }

    let pending = Invitation::find()
        .filter(invitation::Column::TabId.eq(tab_id))
        .filter(invitation::Column::Email.eq(email.as_str()))
        .filter(invitation::Column::Status.eq(InvitationStatus::Pending))
        .one(&txn)
        .await?;
    if pending.is_some() {
        return Err(Error::AlreadyExists {
            message: format!("{email} already has a pending invitation to this tab"),
        });
    }

    let created = invitation::ActiveModel {
        tab_id: Set(tab_id),
        email: Set(email),
        invited_by: Set(invited_by.to_string()),
        invited_at: Set(Utc::now()),
        status: Set(InvitationStatus::Pending),
        token: Set(Uuid::new_v4().to_string()),
        responded_at: Set(None),
        ..Default::default()
    }
    .insert(&txn)
    .await?;
    txn.commit().await?;

    info!("{} invited {} to tab {}", invited_by, created.email, tab_id);
    Ok(created)
}

/// Finds an invitation by its token.
pub async fn get_invitation_by_token<C>(db: &C, token: &str) -> Result<Option<invitation::Model>>
where
    C: ConnectionTrait,
{
    Invitation::find()
        .filter(invitation::Column::Token.eq(token))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Lists a tab's pending invitations, oldest first.
pub async fn get_pending_invitations(
    db: &DatabaseConnection,
    tab_id: i64,
) -> Result<Vec<invitation::Model>> {
    Invitation::find()
        .filter(invitation::Column::TabId.eq(tab_id))
        .filter(invitation::Column::Status.eq(InvitationStatus::Pending))
        .order_by_asc(invitation::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Moves a pending invitation to `status`; returns false if it was no longer pending.
async fn transition<C>(
    db: &C,
    invitation_id: i64,
    status: InvitationStatus,
    now: DateTime<Utc>,
) -> Result<bool>
where
    C: ConnectionTrait,
{
    let result = Invitation::update_many()
        .col_expr(invitation::Column::Status, Expr::value(status))
        .col_expr(invitation::Column::RespondedAt, Expr::value(Some(now)))
        .filter(invitation::Column::Id.eq(invitation_id))
        .filter(invitation::Column::Status.eq(InvitationStatus::Pending))
        .exec(db)
        .await?;
    Ok(result.rows_affected == 1)
}

/// Loads a token that is still usable at `now`, expiring it on the way if it is stale.
async fn load_pending(
    db: &DatabaseConnection,
    token: &str,
    now: DateTime<Utc>,
    ttl_days: i64,
) -> Result<invitation::Model> {
    let invitation = get_invitation_by_token(db, token)
        .await?
        .ok_or_else(|| Error::not_found("Invitation", token))?;

    if invitation.status != InvitationStatus::Pending {
        return Err(Error::validation(format!(
            "This invitation is no longer pending ({:?})",
            invitation.status
        )));
    }
    if is_expired(&invitation, now, ttl_days) {
        transition(db, invitation.id, InvitationStatus::Expired, now).await?;
        return Err(Error::validation("This invitation has expired"));
    }
    Ok(invitation)
}

/// Consumes an invitation and adds `user_id` to its tab.
///
/// When the accepting user has a profile, its email must match the invitation.
///
/// # Errors
/// - [`Error::NotFound`] for an unknown token
/// - [`Error::Validation`] if the invitation is used up or expired
/// - [`Error::Forbidden`] if it was addressed to someone else
/// - [`Error::AlreadyMember`] if the user is already in the tab; the invitation stays pending
pub async fn accept_invitation(
    db: &DatabaseConnection,
    token: &str,
    user_id: &str,
    ttl_days: i64,
    now: DateTime<Utc>,
) -> Result<member::Model> {
    let invitation = load_pending(db, token, now, ttl_days).await?;

    if let Some(profile) = profile::get_profile(db, user_id).await?
        && profile.email != invitation.email
    {
        return Err(Error::forbidden("This invitation was sent to someone else"));
    }

    let txn = db.begin().await?;
    if !transition(&txn, invitation.id, InvitationStatus::Accepted, now).await? {
        return Err(Error::validation("This invitation is no longer pending"));
    }
    let member = tab::add_member(&txn, invitation.tab_id, user_id, MemberRole::Member).await?;
    txn.commit().await?;

    info!(
        "{} accepted invitation {} and joined tab {}",
        user_id, invitation.id, invitation.tab_id
    );
    Ok(member)
}

/// Declines an invitation.
///
/// # Errors
/// - [`Error::NotFound`] for an unknown token
/// - [`Error::Validation`] if the invitation is used up or expired
pub async fn decline_invitation(
    db: &DatabaseConnection,
    token: &str,
    ttl_days: i64,
    now: DateTime<Utc>,
) -> Result<()> {
    let invitation = load_pending(db, token, now, ttl_days).await?;
    if !transition(db, invitation.id, InvitationStatus::Declined, now).await? {
        return Err(Error::validation("This invitation is no longer pending"));
    }
    debug!("Invitation {} declined", invitation.id);
    Ok(())
}

/// Marks every pending invitation sent `ttl_days` or more before `now` as expired.
///
/// Returns how many invitations were expired.
pub async fn expire_stale_invitations(
    db: &DatabaseConnection,
    now: DateTime<Utc>,
    ttl_days: i64,
) -> Result<u64> {
    let cutoff = Duration::try_days(ttl_days).and_then(|ttl| now.checked_sub_signed(ttl));
    let Some(cutoff) = cutoff else {
        return Ok(0);
    };
    let result = Invitation::update_many()
        .col_expr(
            invitation::Column::Status,
            Expr::value(InvitationStatus::Expired),
        )
        .col_expr(invitation::Column::RespondedAt, Expr::value(Some(now)))
        .filter(invitation::Column::Status.eq(InvitationStatus::Pending))
        .filter(invitation::Column::InvitedAt.lte(cutoff))
        .exec(db)
        .await?;
    if result.rows_affected > 0 {
        info!("Expired {} stale invitations", result.rows_affected);
    }
    Ok(result.rows_affected)
}
