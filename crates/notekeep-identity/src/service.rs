//! The identity lifecycle: registration, verification, login, and the
//! administrative toggles around them.
//!
//! ```text
//!  register ──► Registered(unverified) ──worker──► CodeSent
//!                        │                            │
//!                        └────── submit code ─────────┤
//!                                                     ▼
//!                                                 Verified ──► login ok
//!
//!  deactivate / activate flip Active ⇄ Deactivated at any point
//! ```
//!
//! Registration returns as soon as the session is stored and the ticket
//! handed to the delivery queue. Email delivery happens later and its
//! failures never reach the registrant.

use std::sync::Arc;

use notekeep_cache::CacheBackend;
use notekeep_mail::DeliveryQueue;
use notekeep_model::{Role, Session, User, UserId, VerificationCode};
use notekeep_policy::{Enforcer, PolicyStore};
use notekeep_session::{
    Authenticator, Claims, Clock, SessionError, SessionStore, SystemClock, TokenService,
};
use tracing::{debug, info, warn};

use crate::{IdentityError, NewUser, PasswordHasher, ProfileUpdate, StoreError, UserStore, UserView};

// ---------------------------------------------------------------------------
// Inputs and outputs
// ---------------------------------------------------------------------------

/// A registration request.
#[derive(Clone)]
pub struct Registration {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("email", &self.email)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// A user plus a freshly issued bearer token.
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub user: UserView,
    pub token: String,
}

/// Outcome of a code submission that didn't fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    /// The code matched; the account is now verified and holds the
    /// `user` role.
    Verified,
    /// The account was verified before. The code was not looked at; a
    /// role grant that failed the first time is completed.
    AlreadyVerified,
}

// ---------------------------------------------------------------------------
// IdentityService
// ---------------------------------------------------------------------------

/// Composes the user store, session store, token service, delivery
/// queue, and enforcer into the identity use cases.
pub struct IdentityService<U, C, P, K = SystemClock> {
    users: U,
    sessions: Arc<SessionStore<C>>,
    tokens: TokenService<K>,
    queue: DeliveryQueue,
    enforcer: Arc<Enforcer<P>>,
    hasher: PasswordHasher,
}

impl<U, C, P, K> IdentityService<U, C, P, K>
where
    U: UserStore,
    C: CacheBackend,
    P: PolicyStore,
    K: Clock,
{
    pub fn new(
        users: U,
        sessions: Arc<SessionStore<C>>,
        tokens: TokenService<K>,
        queue: DeliveryQueue,
        enforcer: Arc<Enforcer<P>>,
        hasher: PasswordHasher,
    ) -> Self {
        Self {
            users,
            sessions,
            tokens,
            queue,
            enforcer,
            hasher,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionStore<C>> {
        &self.sessions
    }

    pub fn enforcer(&self) -> &Arc<Enforcer<P>> {
        &self.enforcer
    }

    pub fn queue(&self) -> &DeliveryQueue {
        &self.queue
    }

    // -- lifecycle ---------------------------------------------------------

    /// Creates an unverified account, stores its pending session, queues
    /// the verification email, and returns a token right away.
    ///
    /// # Errors
    /// - [`IdentityError::Duplicate`] — username or email taken
    /// - [`IdentityError::Internal`] — hashing, storage or signing failed;
    ///   the half-created row is discarded
    pub async fn register(&self, registration: Registration) -> Result<Authenticated, IdentityError> {
        let password_hash = self.hasher.hash(&registration.password).await?;

        let user = self
            .users
            .create(NewUser {
                first_name: registration.first_name,
                last_name: registration.last_name,
                email: registration.email,
                username: registration.username,
                password_hash,
                role: Role::User,
            })
            .await
            .map_err(|e| match e {
                StoreError::Duplicate { field } => IdentityError::Duplicate { field },
                other => IdentityError::internal("register", other),
            })?;

        let session = Session::pending(
            user.id,
            user.username.as_str(),
            user.email.as_str(),
            user.role,
            VerificationCode::generate(),
        );

        let token = match self.seed_session(&session).await {
            Ok(token) => token,
            Err(e) => {
                if let Err(discard) = self.users.discard(user.id).await {
                    warn!(username = %user.username, error = %discard, "could not discard half-registered user");
                }
                return Err(e);
            }
        };

        if let Err(e) = self.queue.enqueue(session) {
            // The account exists; the code can be re-sent later.
            warn!(username = %user.username, error = %e, "verification email not queued");
        }

        info!(username = %user.username, user_id = %user.id, "user registered");
        Ok(Authenticated {
            user: user.into(),
            token,
        })
    }

    /// Checks the credential and account state, refreshes the session,
    /// and issues a token.
    ///
    /// # Errors
    /// - [`IdentityError::Authentication`] — unknown username or wrong secret
    /// - [`IdentityError::Authorization`] — correct secret, but the account
    ///   is unverified or deactivated
    pub async fn login(&self, username: &str, password: &str) -> Result<Authenticated, IdentityError> {
        let bad_credentials = || IdentityError::Authentication("invalid username or password".into());

        let user = self
            .users
            .find_by_username(username)
            .await
            .map_err(|e| IdentityError::internal("login", e))?
            .ok_or_else(bad_credentials)?;

        if !self.hasher.verify(password, &user.password_hash).await? {
            debug!(%username, "login rejected: wrong password");
            return Err(bad_credentials());
        }
        if !user.is_verified {
            return Err(IdentityError::Authorization("account is not verified".into()));
        }
        if !user.is_active {
            return Err(IdentityError::Authorization("account is deactivated".into()));
        }

        let session = self.refresh_login_session(&user).await?;
        let token = self
            .tokens
            .issue_for(&session)
            .map_err(|e| IdentityError::internal("issue token", e))?;

        info!(%username, "user logged in");
        Ok(Authenticated {
            user: user.into(),
            token,
        })
    }

    /// Matches `code` against the caller's pending session and, on a
    /// match, verifies the account and grants it the `user` role.
    ///
    /// Resubmitting after verification succeeds with
    /// [`Verification::AlreadyVerified`] without comparing codes.
    ///
    /// # Errors
    /// - [`IdentityError::Authentication`] — bad or expired token
    /// - [`IdentityError::NotFound`] — the session lapsed; ask for a resend
    /// - [`IdentityError::InvalidCode`] — wrong code; the session is unchanged
    pub async fn submit_verification_code(
        &self,
        token: &str,
        code: VerificationCode,
    ) -> Result<Verification, IdentityError> {
        let claims = self.authenticate(token).await?;
        let username = claims.username.as_str();

        let session = match self.sessions.get(username).await {
            Ok(session) => session,
            Err(SessionError::NotFound(_)) => {
                // A lapsed session may belong to an account verified long ago.
                return match self.find_user(username, "verify").await? {
                    Some(user) if user.is_verified => {
                        self.grant_user_role(username).await?;
                        Ok(Verification::AlreadyVerified)
                    }
                    _ => Err(IdentityError::NotFound(format!(
                        "no pending verification for {username}"
                    ))),
                };
            }
            Err(e) => return Err(IdentityError::internal("verify", e)),
        };

        if session.is_verified {
            // Completes a grant that failed after the flags were written.
            self.grant_user_role(username).await?;
            return Ok(Verification::AlreadyVerified);
        }
        if !session.code_matches(code) {
            debug!(%username, "verification code mismatch");
            return Err(IdentityError::InvalidCode);
        }

        self.users.mark_verified(username).await.map_err(|e| match e {
            StoreError::NotFound => IdentityError::NotFound(format!("user {username}")),
            other => IdentityError::internal("verify", other),
        })?;
        self.grant_user_role(username).await?;
        self.sessions
            .mark_verified(username)
            .await
            .map_err(|e| IdentityError::internal("verify", e))?;

        info!(%username, "user verified");
        Ok(Verification::Verified)
    }

    /// Issues a new code for the caller's unverified account, replacing
    /// any pending one, and queues it for delivery.
    ///
    /// # Errors
    /// - [`IdentityError::Authentication`] — bad or expired token
    /// - [`IdentityError::AlreadyVerified`] — nothing to resend
    /// - [`IdentityError::NotFound`] — the account no longer exists
    pub async fn resend_code(&self, token: &str) -> Result<(), IdentityError> {
        let claims = self.authenticate(token).await?;
        let user = self
            .find_user(&claims.username, "resend code")
            .await?
            .ok_or_else(|| IdentityError::NotFound(format!("user {}", claims.username)))?;

        if user.is_verified {
            return Err(IdentityError::AlreadyVerified);
        }

        let mut session = Session::pending(
            user.id,
            user.username.as_str(),
            user.email.as_str(),
            user.role,
            VerificationCode::generate(),
        );
        session.is_active = user.is_active;

        self.sessions
            .put(&session)
            .await
            .map_err(|e| IdentityError::internal("resend code", e))?;
        self.queue
            .enqueue(session)
            .map_err(|e| IdentityError::internal("resend code", e))?;

        info!(username = %user.username, "verification code re-issued");
        Ok(())
    }

    /// Verifies a bearer token.
    pub async fn authenticate(&self, token: &str) -> Result<Claims, IdentityError> {
        self.tokens
            .authenticate(token)
            .await
            .map_err(|e| IdentityError::Authentication(e.to_string()))
    }

    // -- administration ----------------------------------------------------

    pub async fn list_users(&self) -> Result<Vec<UserView>, IdentityError> {
        let users = self
            .users
            .list()
            .await
            .map_err(|e| IdentityError::internal("list users", e))?;
        Ok(users.into_iter().map(UserView::from).collect())
    }

    pub async fn user_detail(&self, id: UserId) -> Result<UserView, IdentityError> {
        self.users
            .find_by_id(id)
            .await
            .map_err(|e| IdentityError::internal("user detail", e))?
            .map(UserView::from)
            .ok_or_else(|| IdentityError::NotFound(format!("user {id}")))
    }

    /// Edits the profile of an active user.
    ///
    /// A username change moves the account's role grant to the new name
    /// and drops the session kept under the old one.
    pub async fn update_profile(
        &self,
        id: UserId,
        update: ProfileUpdate,
    ) -> Result<UserView, IdentityError> {
        let before = self
            .users
            .find_by_id(id)
            .await
            .map_err(|e| IdentityError::internal("update profile", e))?
            .ok_or_else(|| IdentityError::NotFound(format!("user {id}")))?;

        let after = self
            .users
            .update_profile(id, update)
            .await
            .map_err(|e| match e {
                StoreError::NotFound => IdentityError::NotFound(format!("user {id}")),
                StoreError::Duplicate { field } => IdentityError::Duplicate { field },
                other => IdentityError::internal("update profile", other),
            })?;

        if before.username != after.username {
            if after.is_verified {
                self.enforcer
                    .grant_role(&after.username, Role::User)
                    .await
                    .map_err(|e| IdentityError::internal("update profile", e))?;
            }
            self.sessions
                .remove(&before.username)
                .await
                .map_err(|e| IdentityError::internal("update profile", e))?;
        }

        info!(user_id = %id, username = %after.username, "profile updated");
        Ok(after.into())
    }

    /// Soft-deletes a user. The row stays; login is refused from now on.
    pub async fn deactivate(&self, id: UserId) -> Result<UserView, IdentityError> {
        self.set_active(id, false).await
    }

    pub async fn activate(&self, id: UserId) -> Result<UserView, IdentityError> {
        self.set_active(id, true).await
    }

    // -- internals ---------------------------------------------------------

    /// Writes `session` and signs a token for it.
    async fn seed_session(&self, session: &Session) -> Result<String, IdentityError> {
        let token = self
            .tokens
            .issue_for(session)
            .map_err(|e| IdentityError::internal("issue token", e))?;
        self.sessions
            .put(session)
            .await
            .map_err(|e| IdentityError::internal("store session", e))?;
        Ok(token)
    }

    /// Clears the code and restarts the TTL of the user's session,
    /// keeping flags other writers set (`is_sent`). Starts a new session
    /// when none is live.
    async fn refresh_login_session(&self, user: &User) -> Result<Session, IdentityError> {
        let refreshed = self
            .sessions
            .update(&user.username, |session| {
                session.user_id = user.id;
                session.email.clone_from(&user.email);
                session.role = user.role;
                session.code = None;
                session.is_verified = user.is_verified;
                session.is_active = user.is_active;
            })
            .await;

        match refreshed {
            Ok(session) => Ok(session),
            Err(SessionError::NotFound(_)) => {
                let session = Session::for_login(user);
                self.sessions
                    .put(&session)
                    .await
                    .map_err(|e| IdentityError::internal("login", e))?;
                Ok(session)
            }
            Err(e) => Err(IdentityError::internal("login", e)),
        }
    }

    /// Grants the `user` role. A no-op when the grant already exists.
    async fn grant_user_role(&self, username: &str) -> Result<(), IdentityError> {
        self.enforcer
            .grant_role(username, Role::User)
            .await
            .map(|_| ())
            .map_err(|e| IdentityError::internal("verify", e))
    }

    async fn find_user(&self, username: &str, operation: &str) -> Result<Option<User>, IdentityError> {
        self.users
            .find_by_username(username)
            .await
            .map_err(|e| IdentityError::internal(operation, e))
    }

    async fn set_active(&self, id: UserId, active: bool) -> Result<UserView, IdentityError> {
        let user = self.users.set_active(id, active).await.map_err(|e| match e {
            StoreError::NotFound => IdentityError::NotFound(format!("user {id}")),
            other => IdentityError::internal("set active", other),
        })?;

        match self.sessions.set_active(&user.username, active).await {
            Ok(_) | Err(SessionError::NotFound(_)) => {}
            Err(e) => return Err(IdentityError::internal("set active", e)),
        }

        info!(user_id = %id, username = %user.username, active, "activation changed");
        Ok(user.into())
    }
}

impl<U, C, P, K> std::fmt::Debug for IdentityService<U, C, P, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityService").finish_non_exhaustive()
    }
}
