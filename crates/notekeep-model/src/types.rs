//! Core records of the identity pipeline.
//!
//! These are the structures that move between the orchestrator, the
//! session store, the delivery queue, and the persisted user store.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::ModelError;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A unique identifier for a persisted user row.
///
/// Newtype wrapper around the row id so a user id can't be confused with
/// a media id or a note id in function signatures.
/// `#[serde(transparent)]` makes `UserId(42)` serialize as plain `42`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "U-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// Coarse-grained subject classification used by the authorization layer.
///
/// Every variant has an explicit numeric id (the value stored in the
/// user row) and an explicit display name (the subject name used in
/// policy rules). Both mappings are `match`es, so adding a variant
/// without naming it is a compile error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A regular account holder.
    User,
    /// An operator with access to administrative routes.
    Admin,
}

impl Role {
    /// Every role, in id order.
    pub const ALL: [Role; 2] = [Role::User, Role::Admin];

    /// The numeric id stored in the persisted user row.
    pub fn id(self) -> i32 {
        match self {
            Self::User => 1,
            Self::Admin => 2,
        }
    }

    /// Looks a role up by its stored numeric id.
    ///
    /// # Errors
    /// Returns [`ModelError::UnknownRole`] for ids with no variant.
    pub fn from_id(id: i32) -> Result<Self, ModelError> {
        match id {
            1 => Ok(Self::User),
            2 => Ok(Self::Admin),
            other => Err(ModelError::UnknownRole(other.to_string())),
        }
    }

    /// The name used for this role in policy rules and API responses.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ModelError::UnknownRole(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// VerificationCode
// ---------------------------------------------------------------------------

/// A six-digit one-time code mailed to a new registrant.
///
/// Stored as a number, displayed zero-padded (`000042`), so a code that
/// happens to start with zeros still reads as six digits in the email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VerificationCode(u32);

impl VerificationCode {
    /// Largest representable code.
    pub const MAX: u32 = 999_999;

    /// Wraps a raw value.
    ///
    /// # Errors
    /// Returns [`ModelError::MalformedCode`] if `value` has more than six digits.
    pub fn new(value: u32) -> Result<Self, ModelError> {
        if value > Self::MAX {
            return Err(ModelError::MalformedCode(value.to_string()));
        }
        Ok(Self(value))
    }

    /// Draws a fresh code uniformly from `000000..=999999`.
    pub fn generate() -> Self {
        Self(rand::rng().random_range(0..=Self::MAX))
    }

    /// The raw numeric value.
    pub fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for VerificationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:06}", self.0)
    }
}

impl FromStr for VerificationCode {
    type Err = ModelError;

    /// Parses user input. Surrounding whitespace is ignored; anything
    /// other than one to six ASCII digits is rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty()
            || trimmed.len() > 6
            || !trimmed.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(ModelError::MalformedCode(s.to_string()));
        }
        let value: u32 = trimmed
            .parse()
            .map_err(|_| ModelError::MalformedCode(s.to_string()))?;
        Self::new(value)
    }
}

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A persisted identity row.
///
/// Created on registration, mutated by verification, profile edits and
/// activation toggles. Rows are never deleted; deactivation flips
/// `is_active` instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub username: String,
    /// PHC-formatted one-way hash of the account secret.
    pub password_hash: String,
    pub role: Role,
    pub is_verified: bool,
    pub is_active: bool,
    /// Optional reference to an uploaded profile photo.
    pub media_id: Option<i64>,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// The cache-only record that tracks one identity's verification state.
///
/// Keyed by username in the session store and expired by TTL. The
/// `code` is `None` once there is no code pending (after a successful
/// verification, or for sessions refreshed by login).
///
/// ```text
///   pending (verified=false, sent=false)
///       │ delivery worker
///       ▼
///   sent (verified=false, sent=true)
///       │ correct code submitted
///       ▼
///   verified (verified=true, code=None)
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: UserId,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub code: Option<VerificationCode>,
    pub is_verified: bool,
    pub is_sent: bool,
    pub is_active: bool,
}

impl Session {
    /// A freshly registered, unverified session awaiting its email.
    pub fn pending(
        user_id: UserId,
        username: impl Into<String>,
        email: impl Into<String>,
        role: Role,
        code: VerificationCode,
    ) -> Self {
        Self {
            user_id,
            username: username.into(),
            email: email.into(),
            role,
            code: Some(code),
            is_verified: false,
            is_sent: false,
            is_active: true,
        }
    }

    /// The session written on a successful login: no code pending,
    /// flags copied from the persisted row.
    pub fn for_login(user: &User) -> Self {
        Self {
            user_id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            role: user.role,
            code: None,
            is_verified: user.is_verified,
            is_sent: false,
            is_active: user.is_active,
        }
    }

    /// Returns `true` if `submitted` is the code this session is waiting for.
    ///
    /// Always `false` once the session is verified: a code is only
    /// meaningful while verification is pending.
    pub fn code_matches(&self, submitted: VerificationCode) -> bool {
        !self.is_verified && self.code == Some(submitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            id: UserId(9),
            first_name: "Alice".into(),
            last_name: "Liddell".into(),
            email: "alice@example.com".into(),
            username: "alice".into(),
            password_hash: "$argon2id$stub".into(),
            role: Role::User,
            is_verified: true,
            is_active: true,
            media_id: None,
        }
    }

    #[test]
    fn test_role_id_round_trips_for_every_variant() {
        for role in Role::ALL {
            assert_eq!(Role::from_id(role.id()).unwrap(), role);
        }
    }

    #[test]
    fn test_role_from_id_unknown_returns_error() {
        assert!(matches!(Role::from_id(0), Err(ModelError::UnknownRole(_))));
        assert!(matches!(Role::from_id(3), Err(ModelError::UnknownRole(_))));
    }

    #[test]
    fn test_role_display_names() {
        assert_eq!(Role::User.to_string(), "user");
        assert_eq!(Role::Admin.to_string(), "admin");
        assert_eq!("ADMIN".parse::<Role>().unwrap(), Role::Admin);
        assert!("root".parse::<Role>().is_err());
    }

    #[test]
    fn test_verification_code_display_is_zero_padded() {
        assert_eq!(VerificationCode::new(42).unwrap().to_string(), "000042");
        assert_eq!(VerificationCode::new(482913).unwrap().to_string(), "482913");
    }

    #[test]
    fn test_verification_code_new_rejects_seven_digits() {
        assert!(VerificationCode::new(1_000_000).is_err());
    }

    #[test]
    fn test_verification_code_parse_accepts_leading_zeros() {
        let code: VerificationCode = " 000000 ".parse().unwrap();
        assert_eq!(code.value(), 0);
    }

    #[test]
    fn test_verification_code_parse_rejects_non_digits() {
        assert!("12a456".parse::<VerificationCode>().is_err());
        assert!("".parse::<VerificationCode>().is_err());
        assert!("-12345".parse::<VerificationCode>().is_err());
        assert!("1234567".parse::<VerificationCode>().is_err());
    }

    #[test]
    fn test_verification_code_generate_stays_in_range() {
        for _ in 0..1_000 {
            assert!(VerificationCode::generate().value() <= VerificationCode::MAX);
        }
    }

    #[test]
    fn test_session_pending_starts_unverified_and_unsent() {
        let code = VerificationCode::new(123456).unwrap();
        let s = Session::pending(UserId(1), "bob", "bob@example.com", Role::User, code);

        assert!(!s.is_verified);
        assert!(!s.is_sent);
        assert!(s.is_active);
        assert_eq!(s.code, Some(code));
    }

    #[test]
    fn test_session_code_matches_only_while_unverified() {
        let code = VerificationCode::new(111111).unwrap();
        let mut s = Session::pending(UserId(1), "bob", "b@x.io", Role::User, code);

        assert!(s.code_matches(code));
        assert!(!s.code_matches(VerificationCode::new(222222).unwrap()));

        s.is_verified = true;
        assert!(!s.code_matches(code), "verified sessions never match");
    }

    #[test]
    fn test_session_for_login_clears_code() {
        let s = Session::for_login(&user());

        assert_eq!(s.code, None);
        assert!(s.is_verified);
        assert_eq!(s.username, "alice");
        assert_eq!(s.user_id, UserId(9));
    }
}
