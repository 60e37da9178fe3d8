//! Session configuration.

use std::time::Duration;

/// Configuration for session storage.
///
/// Every write to the store restarts the entry's countdown at `ttl`, so
/// registration, verification, and login each buy the session a fresh
/// window.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long a session survives after its last write.
    ///
    /// Default: 30 minutes.
    pub ttl: Duration,

    /// Prefix prepended to the username to form the cache key.
    ///
    /// Default: `"session:"`, so `alice` lives at `session:alice`.
    pub key_prefix: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(30 * 60),
            key_prefix: "session:".to_string(),
        }
    }
}
