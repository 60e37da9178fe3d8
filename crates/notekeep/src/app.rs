//! `Notekeep` builder and the routing-layer guard.
//!
//! This is the entry point for running the pipeline. It ties together
//! all the layers: cache → sessions → tokens → delivery queue → policy
//! → identity use cases.

use std::sync::Arc;

use notekeep_cache::CacheBackend;
use notekeep_identity::{IdentityError, IdentityService, PasswordHasher, UserStore};
use notekeep_mail::{DeliveryQueue, MailTransport, QueueStats};
use notekeep_policy::{Enforcer, PolicyStore};
use notekeep_session::{Claims, Clock, SessionStore, SystemClock, TokenService, bearer_token};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::{AppConfig, NotekeepError};

/// Builder for configuring and starting the pipeline.
///
/// # Example
///
/// ```rust,ignore
/// use notekeep::prelude::*;
///
/// let app = Notekeep::builder()
///     .config(AppConfig::from_env()?)
///     .build(MemoryUserStore::new(), MemoryCache::new(), transport, policy_store)
///     .await?;
/// ```
#[derive(Debug)]
pub struct NotekeepBuilder {
    config: AppConfig,
    auto_reload: bool,
}

impl NotekeepBuilder {
    /// Creates a builder with default settings and policy auto-reload on.
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
            auto_reload: true,
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: AppConfig) -> Self {
        self.config = config;
        self
    }

    /// Whether to re-read the policy store every
    /// `config.policy.reload_interval`.
    pub fn auto_reload(mut self, enabled: bool) -> Self {
        self.auto_reload = enabled;
        self
    }

    /// Builds the pipeline on the system clock.
    pub async fn build<U, C, T, P>(
        self,
        users: U,
        cache: C,
        transport: T,
        policy_store: P,
    ) -> Result<Notekeep<U, C, P>, NotekeepError>
    where
        U: UserStore,
        C: CacheBackend,
        T: MailTransport,
        P: PolicyStore,
    {
        self.build_with_clock(users, cache, transport, policy_store, SystemClock)
            .await
    }

    /// Builds the pipeline with token expiry measured on `clock`.
    ///
    /// Fails if the token secret is empty, the password cost settings
    /// are out of range, or the policy store can't be read.
    pub async fn build_with_clock<U, C, T, P, K>(
        self,
        users: U,
        cache: C,
        transport: T,
        policy_store: P,
        clock: K,
    ) -> Result<Notekeep<U, C, P, K>, NotekeepError>
    where
        U: UserStore,
        C: CacheBackend,
        T: MailTransport,
        P: PolicyStore,
        K: Clock,
    {
        let config = self.config;
        let tokens = TokenService::with_clock(&config.token, clock)?;
        let hasher = PasswordHasher::new(&config.password)?;
        let enforcer = Arc::new(Enforcer::load(policy_store).await?);
        let sessions = Arc::new(SessionStore::new(cache, config.session.clone()));

        let (queue, worker) = DeliveryQueue::spawn(transport, Arc::clone(&sessions), config.retry.clone());
        let reloader = self
            .auto_reload
            .then(|| enforcer.spawn_auto_reload(config.policy.reload_interval));

        let identity = IdentityService::new(users, sessions, tokens, queue, enforcer, hasher);
        info!(auto_reload = reloader.is_some(), "notekeep pipeline started");

        Ok(Notekeep {
            identity,
            worker,
            reloader,
        })
    }
}

impl Default for NotekeepBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running pipeline: the identity use cases plus the background
/// delivery worker and policy reloader they depend on.
pub struct Notekeep<U, C, P, K = SystemClock> {
    identity: IdentityService<U, C, P, K>,
    worker: JoinHandle<()>,
    reloader: Option<JoinHandle<()>>,
}

impl Notekeep<(), (), ()> {
    /// Creates a new builder.
    pub fn builder() -> NotekeepBuilder {
        NotekeepBuilder::new()
    }
}

impl<U, C, P, K> Notekeep<U, C, P, K>
where
    U: UserStore,
    C: CacheBackend,
    P: PolicyStore,
    K: Clock,
{
    /// The register / login / verify / admin use cases.
    pub fn identity(&self) -> &IdentityService<U, C, P, K> {
        &self.identity
    }

    /// Guards a route: resolves the bearer token in an `Authorization`
    /// header and asks the enforcer whether its user may perform
    /// `method` on `path`.
    ///
    /// `path` is the route template (`/notes/:id`) or the concrete path;
    /// both match the stored patterns.
    ///
    /// # Errors
    /// - [`IdentityError::Authentication`] — header missing, not a bearer
    ///   token, or the token doesn't verify
    /// - [`IdentityError::Authorization`] — the policy denies the request
    pub async fn authorize(
        &self,
        authorization: Option<&str>,
        path: &str,
        method: &str,
    ) -> Result<Claims, IdentityError> {
        let token = authorization
            .and_then(bearer_token)
            .ok_or_else(|| IdentityError::Authentication("missing bearer token".into()))?;
        let claims = self.identity.authenticate(token).await?;

        if !self.identity.enforcer().enforce_subject(&claims.username, path, method) {
            debug!(username = %claims.username, %path, %method, "request denied by policy");
            return Err(IdentityError::Authorization(format!(
                "{} may not {method} {path}",
                claims.username
            )));
        }
        Ok(claims)
    }

    /// Stops the policy reloader and the delivery worker. Tickets not yet
    /// delivered are abandoned; their sessions keep their codes and can
    /// be re-sent.
    pub async fn shutdown(self) -> Result<QueueStats, NotekeepError> {
        if let Some(reloader) = self.reloader {
            reloader.abort();
        }
        let stats = self.identity.queue().shutdown().await?;
        let _ = self.worker.await;

        info!(
            delivered = stats.delivered,
            pending = stats.pending,
            dead_lettered = stats.dead_lettered,
            "notekeep pipeline stopped"
        );
        Ok(stats)
    }
}

impl<U, C, P, K> std::fmt::Debug for Notekeep<U, C, P, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notekeep")
            .field("auto_reload", &self.reloader.is_some())
            .finish_non_exhaustive()
    }
}
