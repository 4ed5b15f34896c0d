//! Access guard - Who may see and change what in a tab.
//!
//! Identity comes from outside: an [`IdentityProvider`] turns an opaque session token into a
//! user id, and everything else here works on the resolved [`Session`]. Guards return the
//! acting member so callers never have to look the membership up twice.

use crate::{
    core::tab::{self, TabDetail},
    entities::{MemberRole, expense, member, tab as tab_entity},
    errors::{Error, Result},
};
use sea_orm::{ConnectionTrait, DatabaseConnection};
use serde::Serialize;
use std::collections::HashMap;

/// The resolved identity behind a request; `None` when there is no session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    user_id: Option<String>,
}

impl Session {
    /// A request without a session.
    #[must_use]
    pub const fn anonymous() -> Self {
        Self { user_id: None }
    }

    /// A request made by `user_id`.
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
        }
    }

    /// The acting user, if any.
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// The acting user, or [`Error::Unauthenticated`].
    pub fn require_user(&self) -> Result<&str> {
        self.user_id().ok_or(Error::Unauthenticated)
    }
}

/// External session provider.
pub trait IdentityProvider {
    /// Resolves a session token to a user id, or `None` if it is not valid.
    fn resolve(&self, token: &str) -> Option<String>;

    /// Builds the [`Session`] for an optional token.
    fn session(&self, token: Option<&str>) -> Session {
        token
            .and_then(|t| self.resolve(t))
            .map_or_else(Session::anonymous, Session::for_user)
    }
}

/// Fixed token table, for tests and local tooling.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentityProvider {
    tokens: HashMap<String, String>,
}

impl StaticIdentityProvider {
    /// Registers `token` as a session of `user_id`.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>, user_id: impl Into<String>) -> Self {
        self.tokens.insert(token.into(), user_id.into());
        self
    }
}

impl IdentityProvider for StaticIdentityProvider {
    fn resolve(&self, token: &str) -> Option<String> {
        self.tokens.get(token).cloned()
    }
}

/// Who may delete an expense.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpenseDeletePolicy {
    /// Any member of the tab
    AnyMember,
    /// The tab owner or the member who recorded the expense
    OwnerOrCreator,
}

/// Policy applied by [`check_expense_delete`].
pub const EXPENSE_DELETE_POLICY: ExpenseDeletePolicy = ExpenseDeletePolicy::AnyMember;

/// Requires the session to belong to a member of `tab_id`.
///
/// # Errors
/// - [`Error::Unauthenticated`] without a session
/// - [`Error::NotFound`] if the tab does not exist
/// - [`Error::Forbidden`] if the user is not a member
pub async fn require_member<C>(db: &C, session: &Session, tab_id: i64) -> Result<member::Model>
where
    C: ConnectionTrait,
{
    let user_id = session.require_user()?;
    tab::get_tab_by_id(db, tab_id)
        .await?
        .ok_or_else(|| Error::not_found("Tab", tab_id))?;
    tab::get_member(db, tab_id, user_id)
        .await?
        .ok_or_else(|| Error::forbidden("You must be a member of this tab"))
}

/// Requires the session to belong to the owner of `tab_id`.
///
/// # Errors
/// As [`require_member`], plus [`Error::Forbidden`] for non-owners.
pub async fn require_owner<C>(db: &C, session: &Session, tab_id: i64) -> Result<member::Model>
where
    C: ConnectionTrait,
{
    let member = require_member(db, session, tab_id).await?;
    if member.role != MemberRole::Owner {
        return Err(Error::forbidden("Only the tab owner can do that"));
    }
    Ok(member)
}

/// Applies `policy` to `actor` deleting `expense`.
pub fn check_expense_delete(
    policy: ExpenseDeletePolicy,
    actor: &member::Model,
    expense: &expense::Model,
) -> Result<()> {
    let allowed = match policy {
        ExpenseDeletePolicy::AnyMember => actor.tab_id == expense.tab_id,
        ExpenseDeletePolicy::OwnerOrCreator => {
            actor.tab_id == expense.tab_id
                && (actor.role == MemberRole::Owner || actor.user_id == expense.created_by)
        }
    };
    if allowed {
        Ok(())
    } else {
        Err(Error::forbidden("You cannot delete this expense"))
    }
}

/// What a non-member may see of a tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicTab {
    /// Tab id
    pub id: i64,
    /// Tab name
    pub name: String,
    /// Tab description
    pub description: Option<String>,
    /// Always empty for this tier
    pub members: Vec<String>,
}

impl From<&tab_entity::Model> for PublicTab {
    fn from(tab: &tab_entity::Model) -> Self {
        Self {
            id: tab.id,
            name: tab.name.clone(),
            description: tab.description.clone(),
            members: Vec::new(),
        }
    }
}

/// A tab as seen by the requesting session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "visibility", rename_all = "snake_case")]
pub enum TabView {
    /// No session, or a session that is not a member
    Public(PublicTab),
    /// A member: expenses, items, assignments, and member profiles
    Full(TabDetail),
}

/// Reads a tab at the visibility tier the session is entitled to.
///
/// # Errors
/// Returns [`Error::NotFound`] if the tab does not exist.
pub async fn view_tab(db: &DatabaseConnection, session: &Session, tab_id: i64) -> Result<TabView> {
    let tab = tab::get_tab_by_id(db, tab_id)
        .await?
        .ok_or_else(|| Error::not_found("Tab", tab_id))?;

    let is_member = match session.user_id() {
        Some(user_id) => tab::get_member(db, tab_id, user_id).await?.is_some(),
        None => false,
    };
    if !is_member {
        return Ok(TabView::Public(PublicTab::from(&tab)));
    }
    Ok(TabView::Full(tab::load_tab_detail(db, tab).await?))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::*;

    #[test]
    fn test_static_identity_provider() {
        let provider = StaticIdentityProvider::default().with_token("t-1", "alice");
        assert_eq!(provider.session(Some("t-1")), Session::for_user("alice"));
        assert_eq!(provider.session(Some("bogus")), Session::anonymous());
        assert_eq!(provider.session(None), Session::anonymous());
    }

    #[tokio::test]
    async fn test_require_member() -> Result<()> {
        let (db, tab) = setup_with_tab().await?;

        let alice = require_member(&db, &Session::for_user("alice"), tab.id).await?;
        assert_eq!(alice.role, MemberRole::Owner);

        let anonymous = require_member(&db, &Session::anonymous(), tab.id).await;
        assert!(matches!(anonymous, Err(Error::Unauthenticated)));

        let stranger = require_member(&db, &Session::for_user("eve"), tab.id).await;
        assert!(matches!(stranger, Err(Error::Forbidden { .. })));

        let missing = require_member(&db, &Session::for_user("alice"), 777).await;
        assert!(matches!(missing, Err(Error::NotFound { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_require_owner() -> Result<()> {
        let (db, tab) = setup_with_tab().await?;
        tab::add_member(&db, tab.id, "bob", MemberRole::Member).await?;

        assert!(require_owner(&db, &Session::for_user("alice"), tab.id).await.is_ok());
        let bob = require_owner(&db, &Session::for_user("bob"), tab.id).await;
        assert!(matches!(bob, Err(Error::Forbidden { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_expense_delete_policies() -> Result<()> {
        let (db, tab) = setup_with_tab().await?;
        let bob = tab::add_member(&db, tab.id, "bob", MemberRole::Member).await?;
        let carol = tab::add_member(&db, tab.id, "carol", MemberRole::Member).await?;
        let alice = tab::get_member(&db, tab.id, "alice").await?.unwrap();
        let created = create_test_expense(&db, tab.id, "bob", &[("Taxi", 20.0)]).await?;

        let any = ExpenseDeletePolicy::AnyMember;
        assert!(check_expense_delete(any, &carol, &created.expense).is_ok());

        let strict = ExpenseDeletePolicy::OwnerOrCreator;
        assert!(check_expense_delete(strict, &alice, &created.expense).is_ok());
        assert!(check_expense_delete(strict, &bob, &created.expense).is_ok());
        assert!(matches!(
            check_expense_delete(strict, &carol, &created.expense),
            Err(Error::Forbidden { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_view_tab_tiers() -> Result<()> {
        let (db, tab) = setup_with_tab().await?;
        create_test_expense(&db, tab.id, "alice", &[("Cake", 12.0)]).await?;

        for session in [Session::anonymous(), Session::for_user("eve")] {
            match view_tab(&db, &session, tab.id).await? {
                TabView::Public(public) => {
                    assert_eq!(public.name, tab.name);
                    assert!(public.members.is_empty());
                }
                TabView::Full(_) => panic!("non-member saw full detail"),
            }
        }

        match view_tab(&db, &Session::for_user("alice"), tab.id).await? {
            TabView::Full(detail) => {
                assert_eq!(detail.members.len(), 1);
                assert_eq!(detail.expenses.len(), 1);
                assert_eq!(detail.expenses[0].items.len(), 1);
            }
            TabView::Public(_) => panic!("member saw public view"),
        }

        let missing = view_tab(&db, &Session::anonymous(), 404).await;
        assert!(matches!(missing, Err(Error::NotFound { .. })));
        Ok(())
    }
}
