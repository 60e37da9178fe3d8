//! The session store: TTL-bound session records keyed by username.
//!
//! Sessions are shared between request handlers (register, verify,
//! login) and the delivery worker. Two writers can race on the same
//! username, e.g. the worker marking a code as sent while the user
//! submits that code. A blind overwrite of the whole record would let
//! one of the two flags vanish, so every mutation here is a
//! read-modify-write performed under a lock scoped to that username.
//!
//! # Concurrency note
//!
//! Locks are per key. Writers on different usernames never wait for
//! each other beyond the brief lookup in the lock table. A key's lock
//! entry is dropped from the table as soon as nobody holds or awaits it.

use std::collections::HashMap;
use std::sync::Arc;

use notekeep_cache::CacheBackend;
use notekeep_model::{Codec, JsonCodec, Session, VerificationCode};
use tokio::sync::Mutex;

use crate::{SessionConfig, SessionError};

/// Stores [`Session`] records in a [`CacheBackend`].
///
/// ## Lifecycle
///
/// ```text
/// register ──→ put(pending) ──→ mark_sent() ──→ mark_verified()
///                  │                                  │
///                  ▼                                  ▼
///             [expires after ttl unless written again]
///
/// login ──→ put(for_login)   (code cleared, ttl restarted)
/// ```
pub struct SessionStore<C, K = JsonCodec> {
    cache: C,
    codec: K,
    config: SessionConfig,

    /// One async mutex per username currently being written.
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<C: CacheBackend> SessionStore<C, JsonCodec> {
    /// Creates a store that encodes sessions as JSON.
    pub fn new(cache: C, config: SessionConfig) -> Self {
        Self::with_codec(cache, JsonCodec, config)
    }
}

impl<C: CacheBackend, K: Codec> SessionStore<C, K> {
    /// Creates a store with an explicit codec.
    pub fn with_codec(cache: C, codec: K, config: SessionConfig) -> Self {
        Self {
            cache,
            codec,
            config,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// The configuration this store was built with.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Writes `session`, replacing any existing entry for its username
    /// and restarting the TTL.
    pub async fn put(&self, session: &Session) -> Result<(), SessionError> {
        let key = self.key(&session.username);
        let lock = self.key_lock(&key).await;
        let result = {
            let _guard = lock.lock().await;
            self.write(&key, session).await
        };
        self.release_key_lock(&key, lock).await;

        if result.is_ok() {
            tracing::debug!(username = %session.username, "session written");
        }
        result
    }

    /// Reads the live session for `username`.
    ///
    /// # Errors
    /// - [`SessionError::NotFound`] — absent or expired
    /// - [`SessionError::Cache`] / [`SessionError::Codec`] — backend failure
    pub async fn get(&self, username: &str) -> Result<Session, SessionError> {
        let key = self.key(username);
        self.read(&key)
            .await?
            .ok_or_else(|| SessionError::NotFound(username.to_string()))
    }

    /// Applies `f` to the current session for `username` and writes the
    /// result back, all under that username's lock. The TTL restarts.
    ///
    /// Returns the session as written.
    ///
    /// # Errors
    /// Returns [`SessionError::NotFound`] if there is no live session;
    /// `f` is not called in that case.
    pub async fn update<F>(&self, username: &str, f: F) -> Result<Session, SessionError>
    where
        F: FnOnce(&mut Session) + Send,
    {
        let key = self.key(username);
        let lock = self.key_lock(&key).await;
        let result = {
            let _guard = lock.lock().await;
            match self.read(&key).await {
                Ok(Some(mut session)) => {
                    f(&mut session);
                    self.write(&key, &session).await.map(|()| session)
                }
                Ok(None) => Err(SessionError::NotFound(username.to_string())),
                Err(e) => Err(e),
            }
        };
        self.release_key_lock(&key, lock).await;
        result
    }

    /// Records that the email carrying `dispatched` went out.
    ///
    /// The flag is set while the session still holds that same code, or
    /// once it is verified (verification clears the code, so a late
    /// write must not depend on it). If a newer unverified code replaced
    /// it in the meantime, the session is left untouched: the newer code
    /// has not been mailed yet.
    pub async fn mark_sent(
        &self,
        username: &str,
        dispatched: Option<VerificationCode>,
    ) -> Result<Session, SessionError> {
        self.update(username, |session| {
            if session.is_verified || session.code == dispatched {
                session.is_sent = true;
            }
        })
        .await
    }

    /// Promotes the session to verified and clears its code so it can
    /// never be matched again.
    pub async fn mark_verified(&self, username: &str) -> Result<Session, SessionError> {
        self.update(username, |session| {
            session.is_verified = true;
            session.code = None;
        })
        .await
    }

    /// Mirrors an activation toggle of the persisted row.
    pub async fn set_active(&self, username: &str, active: bool) -> Result<Session, SessionError> {
        self.update(username, |session| session.is_active = active).await
    }

    /// Drops the session for `username`, if any.
    pub async fn remove(&self, username: &str) -> Result<(), SessionError> {
        let key = self.key(username);
        let lock = self.key_lock(&key).await;
        let result = {
            let _guard = lock.lock().await;
            self.cache.delete(&key).await.map_err(SessionError::from)
        };
        self.release_key_lock(&key, lock).await;
        result
    }

    // -- internals ---------------------------------------------------------

    fn key(&self, username: &str) -> String {
        format!("{}{}", self.config.key_prefix, username)
    }

    async fn read(&self, key: &str) -> Result<Option<Session>, SessionError> {
        match self.cache.get(key).await? {
            Some(bytes) => Ok(Some(self.codec.decode(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn write(&self, key: &str, session: &Session) -> Result<(), SessionError> {
        let bytes = self.codec.encode(session)?;
        self.cache.set(key, bytes, self.config.ttl).await?;
        Ok(())
    }

    async fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(locks.entry(key.to_string()).or_default())
    }

    async fn release_key_lock(&self, key: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        // One reference in the table plus ours: nobody else holds or awaits it.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(key);
        }
    }
}
