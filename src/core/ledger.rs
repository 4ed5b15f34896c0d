//! Ledger facade - The guarded entry points exposed to collaborators.
//!
//! A [`Ledger`] owns the store handle it was built with and applies the access guard before
//! delegating to the store operations in the sibling modules. The process entry point
//! constructs it once and passes it to whatever transport sits in front.

use crate::{
    config::LedgerSettings,
    core::{
        access::{self, EXPENSE_DELETE_POLICY, Session, TabView},
        assignment,
        expense::{self, DeletedExpense, ExpenseWithItems},
        invitation,
        receipt::{self, ReceiptExtractor},
        shares::{self, ShareReport},
        tab::{self, TabSummary},
    },
    entities::{
        MemberRole, TabStatus, assignment as assignment_entity, invitation as invitation_entity,
        member, tab as tab_entity,
    },
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde_json::Value;
use tracing::{info, instrument};

/// Guarded access to one ledger store.
#[derive(Debug)]
pub struct Ledger {
    db: DatabaseConnection,
    settings: LedgerSettings,
}

impl Ledger {
    /// Wraps a store handle with the given rules.
    #[must_use]
    pub const fn new(db: DatabaseConnection, settings: LedgerSettings) -> Self {
        Self { db, settings }
    }

    /// The underlying store handle.
    #[must_use]
    pub const fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    /// The rules this ledger applies.
    #[must_use]
    pub const fn settings(&self) -> &LedgerSettings {
        &self.settings
    }

    /// Creates a tab owned by the session user.
    #[instrument(skip(self))]
    pub async fn create_tab(
        &self,
        session: &Session,
        name: &str,
        description: Option<&str>,
    ) -> Result<tab_entity::Model> {
        let user_id = session.require_user()?;
        tab::create_tab(&self.db, name, description, user_id).await
    }

    /// Adds a person to a tab directly; owner only.
    ///
    /// Tabs have a single owner, so only [`MemberRole::Member`] can be granted here.
    #[instrument(skip(self))]
    pub async fn add_member(
        &self,
        session: &Session,
        tab_id: i64,
        user_id: &str,
        role: MemberRole,
    ) -> Result<member::Model> {
        access::require_owner(&self.db, session, tab_id).await?;
        if role == MemberRole::Owner {
            return Err(Error::validation("A tab has exactly one owner"));
        }
        tab::add_member(&self.db, tab_id, user_id, role).await
    }

    /// Tabs the session user belongs to; empty without a session.
    #[instrument(skip(self))]
    pub async fn list_tabs(&self, session: &Session) -> Result<Vec<TabSummary>> {
        match session.user_id() {
            Some(user_id) => tab::list_tabs_for_user(&self.db, user_id).await,
            None => Ok(Vec::new()),
        }
    }

    /// Reads a tab at the session's visibility tier.
    #[instrument(skip(self))]
    pub async fn view_tab(&self, session: &Session, tab_id: i64) -> Result<TabView> {
        access::view_tab(&self.db, session, tab_id).await
    }

    /// Changes a tab's lifecycle status; owner only.
    #[instrument(skip(self))]
    pub async fn set_tab_status(
        &self,
        session: &Session,
        tab_id: i64,
        status: TabStatus,
    ) -> Result<tab_entity::Model> {
        access::require_owner(&self.db, session, tab_id).await?;
        tab::set_tab_status(&self.db, tab_id, status).await
    }

    /// Invites an email address to a tab; any member may invite.
    #[instrument(skip(self))]
    pub async fn create_invitation(
        &self,
        session: &Session,
        tab_id: i64,
        email: &str,
    ) -> Result<invitation_entity::Model> {
        let inviter = access::require_member(&self.db, session, tab_id).await?;
        invitation::create_invitation(&self.db, tab_id, email, &inviter.user_id).await
    }

    /// Accepts an invitation as the session user.
    #[instrument(skip(self, token))]
    pub async fn accept_invitation(&self, session: &Session, token: &str) -> Result<member::Model> {
        let user_id = session.require_user()?;
        invitation::accept_invitation(
            &self.db,
            token,
            user_id,
            self.settings.invitation_ttl_days,
            Utc::now(),
        )
        .await
    }

    /// Declines an invitation; requires a session.
    #[instrument(skip(self, token))]
    pub async fn decline_invitation(&self, session: &Session, token: &str) -> Result<()> {
        session.require_user()?;
        invitation::decline_invitation(
            &self.db,
            token,
            self.settings.invitation_ttl_days,
            Utc::now(),
        )
        .await
    }

    /// Expires every invitation past its lifetime. Maintenance; not tied to a session.
    pub async fn expire_stale_invitations(&self) -> Result<u64> {
        invitation::expire_stale_invitations(
            &self.db,
            Utc::now(),
            self.settings.invitation_ttl_days,
        )
        .await
    }

    /// Normalizes a raw extracted receipt and records it in a tab; members only.
    #[instrument(skip(self, raw_receipt))]
    pub async fn create_expense(
        &self,
        session: &Session,
        tab_id: i64,
        raw_receipt: &Value,
    ) -> Result<ExpenseWithItems> {
        let creator = access::require_member(&self.db, session, tab_id).await?;
        let normalized = receipt::normalize_value(raw_receipt, self.settings.max_item_quantity)?;
        expense::create_expense(&self.db, tab_id, &creator.user_id, &normalized).await
    }

    /// Sends an image through the extraction service and records the result; members only.
    #[instrument(skip(self, extractor, image_data))]
    pub async fn create_expense_from_image<E>(
        &self,
        session: &Session,
        tab_id: i64,
        extractor: &E,
        image_data: &str,
    ) -> Result<ExpenseWithItems>
    where
        E: ReceiptExtractor + Sync,
    {
        access::require_member(&self.db, session, tab_id).await?;
        let reply = extractor.extract(image_data).await?;
        let raw = receipt::extract_receipt_json(&reply)?;
        info!("Extraction service returned a receipt for tab {}", tab_id);
        self.create_expense(session, tab_id, &raw).await
    }

    /// Deletes an expense with its items and their assignments.
    #[instrument(skip(self))]
    pub async fn delete_expense(
        &self,
        session: &Session,
        expense_id: i64,
    ) -> Result<DeletedExpense> {
        session.require_user()?;
        let expense = expense::get_expense_by_id(&self.db, expense_id)
            .await?
            .ok_or_else(|| Error::not_found("Expense", expense_id))?;
        let actor = access::require_member(&self.db, session, expense.tab_id).await?;
        access::check_expense_delete(EXPENSE_DELETE_POLICY, &actor, &expense)?;
        expense::delete_expense(&self.db, expense_id).await
    }

    /// Claims a line item for the session user.
    #[instrument(skip(self))]
    pub async fn assign(
        &self,
        session: &Session,
        line_item_id: i64,
        share_amount: f64,
    ) -> Result<assignment_entity::Model> {
        let actor = self.member_for_line_item(session, line_item_id).await?;
        assignment::assign(&self.db, actor.id, line_item_id, share_amount).await
    }

    /// Releases the session user's claim on a line item.
    #[instrument(skip(self))]
    pub async fn unassign(&self, session: &Session, line_item_id: i64) -> Result<()> {
        let actor = self.member_for_line_item(session, line_item_id).await?;
        assignment::unassign(&self.db, actor.id, line_item_id).await
    }

    /// Per-member owed totals and reconciliation flags for a tab; members only.
    #[instrument(skip(self))]
    pub async fn compute_shares(&self, session: &Session, tab_id: i64) -> Result<ShareReport> {
        access::require_member(&self.db, session, tab_id).await?;
        shares::compute_shares(&self.db, tab_id, self.settings.rounding_tolerance).await
    }

    async fn member_for_line_item(
        &self,
        session: &Session,
        line_item_id: i64,
    ) -> Result<member::Model> {
        session.require_user()?;
        let (_item, expense) = expense::get_expense_for_line_item(&self.db, line_item_id).await?;
        access::require_member(&self.db, session, expense.tab_id).await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::core::shares::Reconciliation;
    use crate::test_utils::*;
    use serde_json::json;

    struct CannedExtractor(&'static str);

    impl ReceiptExtractor for CannedExtractor {
        async fn extract(&self, _image_data: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    async fn ledger_with_tab() -> Result<(Ledger, tab_entity::Model)> {
        let ledger = setup_test_ledger().await?;
        let tab = ledger
            .create_tab(&Session::for_user("alice"), "Dinner", None)
            .await?;
        Ok((ledger, tab))
    }

    #[tokio::test]
    async fn test_create_tab_requires_session() -> Result<()> {
        let ledger = setup_test_ledger().await?;
        let result = ledger.create_tab(&Session::anonymous(), "Dinner", None).await;
        assert!(matches!(result, Err(Error::Unauthenticated)));
        Ok(())
    }

    #[tokio::test]
    async fn test_add_member_is_owner_only() -> Result<()> {
        let (ledger, tab) = ledger_with_tab().await?;
        let alice = Session::for_user("alice");
        let bob = Session::for_user("bob");

        ledger.add_member(&alice, tab.id, "bob", MemberRole::Member).await?;
        let by_member = ledger.add_member(&bob, tab.id, "carol", MemberRole::Member).await;
        assert!(matches!(by_member, Err(Error::Forbidden { .. })));

        let second_owner = ledger.add_member(&alice, tab.id, "dave", MemberRole::Owner).await;
        assert!(matches!(second_owner, Err(Error::Validation { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_end_to_end_split() -> Result<()> {
        let (ledger, tab) = ledger_with_tab().await?;
        let alice = Session::for_user("alice");
        let bob = Session::for_user("bob");

        let invitation = ledger.create_invitation(&alice, tab.id, "bob@example.com").await?;
        let bob_member = ledger.accept_invitation(&bob, &invitation.token).await?;

        let raw = json!({
            "merchant": "Trattoria",
            "items": [{"name": "Platter", "quantity": 1, "totalPrice": 27, "totalWithTip": 30}],
            "totals": {"subtotal": 27, "tax": 0, "tip": 3, "total": 30}
        });
        let created = ledger.create_expense(&bob, tab.id, &raw).await?;
        let item = &created.items[0];

        ledger.assign(&alice, item.id, 15.0).await?;
        ledger.assign(&bob, item.id, 15.0).await?;

        let report = ledger.compute_shares(&alice, tab.id).await?;
        let alice_member = tab::get_member(ledger.db(), tab.id, "alice").await?.unwrap();
        assert_eq!(report.owed_total(alice_member.id), 15.0);
        assert_eq!(report.owed_total(bob_member.id), 15.0);
        assert_eq!(report.reconciliation, Reconciliation::Balanced);
        assert_eq!(report.over_assigned_items().count(), 0);

        // Releasing Bob's half leaves Alice's claim in place.
        ledger.unassign(&bob, item.id).await?;
        let report = ledger.compute_shares(&bob, tab.id).await?;
        assert_eq!(report.owed_total(bob_member.id), 0.0);
        assert!(!report.is_balanced());
        Ok(())
    }

    #[tokio::test]
    async fn test_non_members_are_kept_out() -> Result<()> {
        let (ledger, tab) = ledger_with_tab().await?;
        let eve = Session::for_user("eve");
        let created = ledger
            .create_expense(
                &Session::for_user("alice"),
                tab.id,
                &json!({"items": [{"name": "Fish", "totalWithTax": 14}]}),
            )
            .await?;

        let cases = [
            ledger.create_expense(&eve, tab.id, &json!({})).await.err(),
            ledger.assign(&eve, created.items[0].id, 1.0).await.err(),
            ledger.unassign(&eve, created.items[0].id).await.err(),
            ledger.compute_shares(&eve, tab.id).await.err(),
            ledger.delete_expense(&eve, created.expense.id).await.err(),
            ledger.create_invitation(&eve, tab.id, "eve@example.com").await.err(),
        ];
        for err in cases {
            assert!(matches!(err, Some(Error::Forbidden { .. })), "{err:?}");
        }

        let anonymous = ledger.assign(&Session::anonymous(), created.items[0].id, 1.0).await;
        assert!(matches!(anonymous, Err(Error::Unauthenticated)));
        Ok(())
    }

    #[tokio::test]
    async fn test_any_member_may_delete_expense() -> Result<()> {
        let (ledger, tab) = ledger_with_tab().await?;
        let alice = Session::for_user("alice");
        ledger.add_member(&alice, tab.id, "bob", MemberRole::Member).await?;

        let created = ledger
            .create_expense(&alice, tab.id, &json!({"items": [{"name": "Tapas", "quantity": 5}]}))
            .await?;
        let deleted = ledger
            .delete_expense(&Session::for_user("bob"), created.expense.id)
            .await?;
        assert_eq!(deleted.line_items, 5);

        let again = ledger.delete_expense(&alice, created.expense.id).await;
        assert!(matches!(again, Err(Error::NotFound { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_malformed_receipt_is_rejected_without_writes() -> Result<()> {
        let (ledger, tab) = ledger_with_tab().await?;
        let alice = Session::for_user("alice");

        let result = ledger
            .create_expense(&alice, tab.id, &json!({"items": "three pizzas"}))
            .await;
        assert!(matches!(result, Err(Error::MalformedInput { .. })));

        match ledger.view_tab(&alice, tab.id).await? {
            TabView::Full(detail) => assert!(detail.expenses.is_empty()),
            TabView::Public(_) => panic!("owner should see full detail"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_create_expense_from_image() -> Result<()> {
        let (ledger, tab) = ledger_with_tab().await?;
        let alice = Session::for_user("alice");
        let extractor = CannedExtractor(
            "Sure! {\"merchant\": \"Bakery\", \"items\": [{\"name\": \"Croissant\", \"quantity\": 3, \"totalPrice\": 9, \"totalWithTax\": 9.9}], \"totals\": {\"total\": 9.9}}",
        );

        let created = ledger
            .create_expense_from_image(&alice, tab.id, &extractor, "data:image/png;base64,AAAA")
            .await?;
        assert_eq!(created.expense.place_name, "Bakery");
        assert_eq!(created.items.len(), 3);

        let garbled = CannedExtractor("no receipt here");
        let result = ledger
            .create_expense_from_image(&alice, tab.id, &garbled, "data:image/png;base64,AAAA")
            .await;
        assert!(matches!(result, Err(Error::MalformedInput { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_set_tab_status_and_list() -> Result<()> {
        let (ledger, tab) = ledger_with_tab().await?;
        let alice = Session::for_user("alice");

        ledger.set_tab_status(&alice, tab.id, TabStatus::Archived).await?;
        let tabs = ledger.list_tabs(&alice).await?;
        assert_eq!(tabs.len(), 1);
        assert_eq!(tabs[0].tab.status, TabStatus::Archived);

        assert!(ledger.list_tabs(&Session::anonymous()).await?.is_empty());
        Ok(())
    }
}
