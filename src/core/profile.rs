//! Profile business logic - Display details for people known by user id.

use crate::{
    entities::{Profile, profile},
    errors::{Error, Result},
};
use sea_orm::{Set, prelude::*};

/// Creates or refreshes the profile for `user_id`.
///
/// The email is trimmed and lowercased so invitations can be matched against it.
pub async fn upsert_profile<C>(
    db: &C,
    user_id: &str,
    email: &str,
    display_name: Option<&str>,
) -> Result<profile::Model>
where
    C: ConnectionTrait,
{
    if user_id.trim().is_empty() {
        return Err(Error::validation("Profile user id is required"));
    }
    let email = email.trim().to_lowercase();
    let display_name = display_name
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(ToString::to_string);
    let now = chrono::Utc::now();

    match Profile::find_by_id(user_id.to_string()).one(db).await? {
        Some(existing) => {
            let mut active: profile::ActiveModel = existing.into();
            active.email = Set(email);
            active.display_name = Set(display_name);
            active.updated_at = Set(now);
            active.update(db).await.map_err(Into::into)
        }
        None => profile::ActiveModel {
            id: Set(user_id.to_string()),
            email: Set(email),
            display_name: Set(display_name),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await
        .map_err(Into::into),
    }
}

/// Finds one profile by user id.
pub async fn get_profile<C>(db: &C, user_id: &str) -> Result<Option<profile::Model>>
where
    C: ConnectionTrait,
{
    Profile::find_by_id(user_id.to_string())
        .one(db)
        .await
        .map_err(Into::into)
}

/// Finds the profile registered under an email address.
pub async fn find_profile_by_email<C>(db: &C, email: &str) -> Result<Option<profile::Model>>
where
    C: ConnectionTrait,
{
    Profile::find()
        .filter(profile::Column::Email.eq(email.trim().to_lowercase()))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Finds the profiles that exist for the given user ids.
pub async fn get_profiles_by_ids<C>(db: &C, user_ids: &[String]) -> Result<Vec<profile::Model>>
where
    C: ConnectionTrait,
{
    if user_ids.is_empty() {
        return Ok(Vec::new());
    }
    Profile::find()
        .filter(profile::Column::Id.is_in(user_ids.iter().cloned()))
        .all(db)
        .await
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::setup_test_db;

    #[tokio::test]
    async fn test_upsert_profile_inserts_then_updates() -> Result<()> {
        let db = setup_test_db().await?;

        let created = upsert_profile(&db, "alice", " Alice@Example.com ", Some("Alice")).await?;
        assert_eq!(created.email, "alice@example.com");
        assert_eq!(created.display_name.as_deref(), Some("Alice"));

        let updated = upsert_profile(&db, "alice", "alice@example.org", None).await?;
        assert_eq!(updated.email, "alice@example.org");
        assert!(updated.display_name.is_none());
        assert_eq!(updated.created_at, created.created_at);

        let found = get_profile(&db, "alice").await?.unwrap();
        assert_eq!(found, updated);
        Ok(())
    }

    #[tokio::test]
    async fn test_get_profiles_by_ids_skips_unknown() -> Result<()> {
        let db = setup_test_db().await?;
        upsert_profile(&db, "alice", "alice@example.com", None).await?;

        let profiles =
            get_profiles_by_ids(&db, &["alice".to_string(), "ghost".to_string()]).await?;
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].id, "alice");
        Ok(())
    }
}
