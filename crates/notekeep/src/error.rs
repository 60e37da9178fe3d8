//! Unified error type for the Notekeep pipeline.

use notekeep_cache::CacheError;
use notekeep_identity::{IdentityError, StoreError};
use notekeep_mail::MailError;
use notekeep_model::ModelError;
use notekeep_policy::PolicyError;
use notekeep_session::SessionError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `notekeep` crate you deal with this single error type
/// instead of importing errors from each layer. `?` converts the layer
/// errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum NotekeepError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Mail(#[from] MailError),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// An identity use case failed. Carries the kind the caller maps to
    /// a response.
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// A configuration value is missing or unparsable.
    #[error("configuration: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_session_error() {
        let err: NotekeepError = SessionError::AuthFailed("nope".into()).into();
        assert!(matches!(err, NotekeepError::Session(_)));
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn test_from_mail_error() {
        let err: NotekeepError = MailError::QueueClosed.into();
        assert!(matches!(err, NotekeepError::Mail(_)));
    }

    #[test]
    fn test_from_identity_error_keeps_kind() {
        let err: NotekeepError = IdentityError::InvalidCode.into();
        assert!(matches!(err, NotekeepError::Identity(IdentityError::InvalidCode)));
    }

    #[test]
    fn test_from_store_error() {
        let err: NotekeepError = StoreError::NotFound.into();
        assert!(matches!(err, NotekeepError::Store(_)));
    }
}
