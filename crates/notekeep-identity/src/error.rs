//! Error types for the identity layer.

/// Errors reported by a [`UserStore`](crate::UserStore).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// A uniqueness constraint was violated. `field` names the column
    /// (`username`, `email`).
    #[error("{field} already exists")]
    Duplicate { field: String },

    /// No row matched.
    #[error("user not found")]
    NotFound,

    /// Any other storage failure.
    #[error("user store: {0}")]
    Backend(String),
}

/// The outcome kinds callers of the identity use cases see.
///
/// | Variant | Meaning | HTTP |
/// |---|---|---|
/// | `Authentication` | bad credential, bad or expired token | 401 |
/// | `Authorization` | identity is fine, the account state forbids it | 403 |
/// | `Duplicate` | username or email taken | 409 |
/// | `AlreadyVerified` | nothing left to verify | 409 |
/// | `InvalidCode` | submitted code doesn't match | 422 |
/// | `NotFound` | no such user or session | 404 |
/// | `Internal` | storage, cache, hashing or signing failure | 500 |
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("not authorized: {0}")]
    Authorization(String),

    #[error("{field} already exists")]
    Duplicate { field: String },

    #[error("account is already verified")]
    AlreadyVerified,

    #[error("verification code does not match")]
    InvalidCode,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IdentityError {
    /// The HTTP status the routing layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Authentication(_) => 401,
            Self::Authorization(_) => 403,
            Self::NotFound(_) => 404,
            Self::Duplicate { .. } | Self::AlreadyVerified => 409,
            Self::InvalidCode => 422,
            Self::Internal(_) => 500,
        }
    }

    /// Wraps a lower-layer failure with the operation it happened in.
    pub(crate) fn internal(operation: &str, error: impl std::fmt::Display) -> Self {
        Self::Internal(format!("{operation}: {error}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_per_kind() {
        assert_eq!(IdentityError::Authentication("x".into()).status_code(), 401);
        assert_eq!(IdentityError::Authorization("x".into()).status_code(), 403);
        assert_eq!(IdentityError::Duplicate { field: "email".into() }.status_code(), 409);
        assert_eq!(IdentityError::InvalidCode.status_code(), 422);
        assert_eq!(IdentityError::NotFound("x".into()).status_code(), 404);
        assert_eq!(IdentityError::internal("login", "boom").status_code(), 500);
    }

    #[test]
    fn test_internal_carries_operation_context() {
        let err = IdentityError::internal("register", "cache down");
        assert_eq!(err.to_string(), "internal error: register: cache down");
    }

    #[test]
    fn test_duplicate_names_the_field() {
        let err = IdentityError::Duplicate { field: "username".into() };
        assert_eq!(err.to_string(), "username already exists");
    }
}
