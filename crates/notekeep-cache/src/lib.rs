//! Cache backend abstraction for Notekeep.
//!
//! Provides the [`CacheBackend`] trait that the session store talks to,
//! and [`MemoryCache`], an in-process implementation with per-entry TTL.
//!
//! # Feature Flags
//!
//! - `memory` (default) — the in-process [`MemoryCache`]

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "memory")]
mod memory;

pub use error::CacheError;
#[cfg(feature = "memory")]
pub use memory::MemoryCache;

use std::future::Future;
use std::time::Duration;

/// A key-value store with per-entry expiry.
///
/// Values are opaque bytes; encoding is the caller's concern. A missing
/// or expired key is not an error: [`get`](Self::get) returns `Ok(None)`
/// so callers can tell "no entry" apart from "the backend is broken".
pub trait CacheBackend: Send + Sync + 'static {
    /// Reads the value stored under `key`.
    ///
    /// Returns `Ok(None)` when the key is absent or its TTL has lapsed.
    fn get(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, CacheError>> + Send;

    /// Stores `value` under `key`, replacing any previous value and
    /// restarting the expiry countdown at `ttl`.
    fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> impl Future<Output = Result<(), CacheError>> + Send;

    /// Removes `key`. Removing an absent key succeeds.
    fn delete(&self, key: &str) -> impl Future<Output = Result<(), CacheError>> + Send;
}

impl<T: CacheBackend> CacheBackend for std::sync::Arc<T> {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        (**self).set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        (**self).delete(key).await
    }
}
