//! Signed, time-limited identity tokens.
//!
//! A token is an HS256 JWT carrying the user id, username, role and an
//! expiry. There is no revocation list: expiry is the only way a token
//! stops working. Expiry is checked against the service's [`Clock`] at
//! verification time, which lets tests pin the clock instead of sleeping.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use notekeep_model::{Role, Session, UserId};
use serde::{Deserialize, Serialize};

use crate::SessionError;

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Source of wall-clock time for issuing and checking tokens.
pub trait Clock: Send + Sync + 'static {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// The real system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct FixedClock {
    secs: Arc<AtomicI64>,
}

impl FixedClock {
    /// A clock stopped at `at` (sub-second precision is dropped).
    pub fn at(at: DateTime<Utc>) -> Self {
        Self {
            secs: Arc::new(AtomicI64::new(at.timestamp())),
        }
    }

    /// Moves the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        let secs = i64::try_from(by.as_secs()).unwrap_or(i64::MAX);
        self.secs.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.secs.load(Ordering::SeqCst), 0).unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Claims
// ---------------------------------------------------------------------------

/// The claim set carried inside a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user id as a string.
    pub sub: String,
    pub user_id: UserId,
    pub username: String,
    pub role: Role,
    /// Issued-at, seconds since the Unix epoch.
    pub iat: i64,
    /// Expiry, seconds since the Unix epoch. The token is rejected at
    /// and after this second.
    pub exp: i64,
}

// ---------------------------------------------------------------------------
// TokenConfig
// ---------------------------------------------------------------------------

/// Signing configuration, built once at startup.
#[derive(Clone)]
pub struct TokenConfig {
    /// Shared HMAC secret. Must not be empty.
    pub secret: String,

    /// How long a token stays valid after issuance.
    ///
    /// Default: 30 minutes.
    pub validity: Duration,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            validity: Duration::from_secs(30 * 60),
        }
    }
}

impl fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenConfig")
            .field("secret", &"<redacted>")
            .field("validity", &self.validity)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// TokenService
// ---------------------------------------------------------------------------

/// Issues and verifies tokens. Pure: no I/O, no shared mutable state.
#[derive(Clone)]
pub struct TokenService<K = SystemClock> {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    validity: chrono::Duration,
    clock: K,
}

impl TokenService<SystemClock> {
    /// Builds a service on the system clock.
    ///
    /// # Errors
    /// Returns [`SessionError::InvalidConfig`] for an empty secret or a
    /// validity that doesn't fit a timestamp.
    pub fn new(config: &TokenConfig) -> Result<Self, SessionError> {
        Self::with_clock(config, SystemClock)
    }
}

impl<K: Clock> TokenService<K> {
    /// Builds a service on an explicit clock.
    pub fn with_clock(config: &TokenConfig, clock: K) -> Result<Self, SessionError> {
        if config.secret.is_empty() {
            return Err(SessionError::InvalidConfig("token secret is empty".into()));
        }
        let validity = chrono::Duration::from_std(config.validity)
            .map_err(|e| SessionError::InvalidConfig(format!("token validity: {e}")))?;

        // Expiry is checked by hand against `clock`, not by jsonwebtoken
        // against the system time.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();
        validation.leeway = 0;

        Ok(Self {
            encoding: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
            validity,
            clock,
        })
    }

    /// Signs a token for the given identity, valid from now for the
    /// configured window.
    pub fn issue(&self, user_id: UserId, username: &str, role: Role) -> Result<String, SessionError> {
        let now = self.clock.now();
        let claims = Claims {
            sub: user_id.0.to_string(),
            user_id,
            username: username.to_string(),
            role,
            iat: now.timestamp(),
            exp: (now + self.validity).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| SessionError::Signing(e.to_string()))
    }

    /// Signs a token for the identity a session belongs to.
    pub fn issue_for(&self, session: &Session) -> Result<String, SessionError> {
        self.issue(session.user_id, &session.username, session.role)
    }

    /// Checks the signature and expiry of `token` and returns its claims.
    ///
    /// # Errors
    /// Returns [`SessionError::AuthFailed`] if the token is malformed,
    /// signed with another key, or expired.
    pub fn verify(&self, token: &str) -> Result<Claims, SessionError> {
        let claims = decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|e| SessionError::AuthFailed(e.to_string()))?
            .claims;

        if claims.exp <= self.clock.now().timestamp() {
            return Err(SessionError::AuthFailed("token expired".into()));
        }
        Ok(claims)
    }

    /// The configured validity window.
    pub fn validity(&self) -> Duration {
        self.validity.to_std().unwrap_or_default()
    }
}

impl<K> fmt::Debug for TokenService<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenService")
            .field("validity", &self.validity)
            .finish_non_exhaustive()
    }
}
