//! Unified error type for the ledger core.
//!
//! Expected outcomes (bad input, missing rows, permission denials, duplicate
//! claims) get their own variants so callers can match on them. Anything the
//! store itself reports ends up in [`Error::Persistence`].

use sea_orm::{DbErr, SqlErr};
use thiserror::Error;

/// Errors returned by every ledger operation.
#[derive(Debug, Error)]
pub enum Error {
    /// Caller-correctable input problem (empty name, overlong text, bad amount)
    #[error("Validation error: {message}")]
    Validation {
        /// Human-readable reason
        message: String,
    },

    /// A referenced entity does not exist
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of entity that was looked up
        entity: &'static str,
        /// Identifier that failed to resolve
        id: String,
    },

    /// The person is already a member of the tab
    #[error("User {user_id} is already a member of tab {tab_id}")]
    AlreadyMember {
        /// Tab being joined
        tab_id: i64,
        /// Person attempting to join
        user_id: String,
    },

    /// A uniquely keyed record already exists
    #[error("Already exists: {message}")]
    AlreadyExists {
        /// Human-readable reason
        message: String,
    },

    /// The acting identity lacks rights over the target
    #[error("Forbidden: {message}")]
    Forbidden {
        /// Human-readable reason
        message: String,
    },

    /// No session was supplied for an operation that needs one
    #[error("Authentication required")]
    Unauthenticated,

    /// The extraction payload could not be read as a receipt at all
    #[error("Malformed input: {message}")]
    MalformedInput {
        /// Human-readable reason
        message: String,
    },

    /// Configuration could not be loaded
    #[error("Configuration error: {message}")]
    Config {
        /// Human-readable reason
        message: String,
    },

    /// I/O failure while reading files
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Store-level fault
    #[error("Persistence error: {0}")]
    Persistence(#[from] DbErr),
}

impl Error {
    /// Shorthand for a [`Error::Validation`] with the given message.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Shorthand for a [`Error::NotFound`].
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Shorthand for a [`Error::Forbidden`] with the given message.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    /// Shorthand for a [`Error::MalformedInput`] with the given message.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedInput {
            message: message.into(),
        }
    }

    /// Short reason suitable for showing at the caller boundary.
    ///
    /// Storage and I/O details are replaced with a generic message; they are
    /// logged where they occur instead.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Persistence(_) | Self::Io(_) => {
                "Something went wrong while saving. Please try again.".to_string()
            }
            Self::Config { .. } => "The service is misconfigured.".to_string(),
            Self::Validation { message }
            | Self::AlreadyExists { message }
            | Self::Forbidden { message }
            | Self::MalformedInput { message } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Whether the failure is an expected, caller-recoverable outcome.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Persistence(_) | Self::Io(_) | Self::Config { .. })
    }
}

/// Returns true when the store rejected a write because of a unique index.
pub(crate) fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

/// Returns true when the store rejected a write because a referenced row is gone.
pub(crate) fn is_foreign_key_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::ForeignKeyConstraintViolation(_)))
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
