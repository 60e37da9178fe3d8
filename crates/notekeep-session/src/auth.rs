//! Bearer-token authentication.
//!
//! Requests identify themselves with an `Authorization: Bearer <token>`
//! header. [`bearer_token`] pulls the token out of that header and an
//! [`Authenticator`] turns it into [`Claims`]. The production
//! authenticator is [`TokenService`]; tests and embedders can plug in
//! their own.

use crate::{Claims, Clock, SessionError, TokenService};

/// Validates a bearer token and returns the identity it carries.
///
/// # Example
///
/// ```rust
/// use notekeep_model::{Role, UserId};
/// use notekeep_session::{Authenticator, Claims, SessionError};
///
/// /// Treats every token as the username of a plain user.
/// struct TrustingAuthenticator;
///
/// impl Authenticator for TrustingAuthenticator {
///     async fn authenticate(&self, token: &str) -> Result<Claims, SessionError> {
///         if token.is_empty() {
///             return Err(SessionError::AuthFailed("empty token".into()));
///         }
///         Ok(Claims {
///             sub: "0".into(),
///             user_id: UserId(0),
///             username: token.to_string(),
///             role: Role::User,
///             iat: 0,
///             exp: i64::MAX,
///         })
///     }
/// }
/// ```
pub trait Authenticator: Send + Sync + 'static {
    /// Returns the claims of a valid token, or
    /// [`SessionError::AuthFailed`].
    fn authenticate(
        &self,
        token: &str,
    ) -> impl std::future::Future<Output = Result<Claims, SessionError>> + Send;
}

impl<K: Clock> Authenticator for TokenService<K> {
    async fn authenticate(&self, token: &str) -> Result<Claims, SessionError> {
        self.verify(token)
    }
}

/// Extracts the token from an `Authorization` header value.
///
/// The scheme is matched case-insensitively and surrounding whitespace
/// is ignored. Returns `None` for any other scheme or an empty token.
pub fn bearer_token(header: &str) -> Option<&str> {
    let header = header.trim();
    let (scheme, token) = header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}
