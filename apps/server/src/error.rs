//! Error types for the surrogate key catalog

use crate::catalog::Vocabulary;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// A lookup was attempted before `start()` completed.
    #[error("Surrogate key catalog has not been started")]
    NotStarted,

    #[error("Surrogate key catalog bootstrap is already in progress")]
    BootstrapInProgress,

    #[error("Unknown {vocabulary} key: {key}")]
    UnknownKey { vocabulary: Vocabulary, key: String },

    #[error("Unknown {vocabulary} id: {id}")]
    UnknownId { vocabulary: Vocabulary, id: i64 },

    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] sqlx::Error),

    #[error("Schema migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Search parameter status sync failed: {0}")]
    StatusSyncFailed(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid vocabulary data: {0}")]
    InvalidVocabulary(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Whether the caller may repeat the operation.
    ///
    /// Only store failures qualify; a failed cold-path lookup leaves the
    /// in-memory cache untouched, so repeating it simply repeats the round trip.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::StoreUnavailable(_))
    }

    /// SQLSTATE of the underlying database error, if any.
    pub fn sqlstate(&self) -> Option<String> {
        match self {
            Error::StoreUnavailable(sqlx::Error::Database(db)) => {
                db.code().map(|code| code.into_owned())
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_store_failures_are_retryable() {
        assert!(Error::StoreUnavailable(sqlx::Error::PoolTimedOut).is_retryable());
        assert!(!Error::NotStarted.is_retryable());
        assert!(!Error::UnknownKey {
            vocabulary: Vocabulary::ResourceType,
            key: "Encounter".to_string(),
        }
        .is_retryable());
        assert!(!Error::StatusSyncFailed("boom".to_string()).is_retryable());
    }

    #[test]
    fn unknown_key_message_names_vocabulary() {
        let err = Error::UnknownKey {
            vocabulary: Vocabulary::ClaimType,
            key: "tid".to_string(),
        };
        assert_eq!(err.to_string(), "Unknown claim type key: tid");
    }

    #[test]
    fn sqlstate_is_absent_for_non_database_errors() {
        assert_eq!(Error::StoreUnavailable(sqlx::Error::PoolClosed).sqlstate(), None);
        assert_eq!(Error::NotStarted.sqlstate(), None);
    }
}
