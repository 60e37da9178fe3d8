//! Error types for the session layer.

use notekeep_cache::CacheError;
use notekeep_model::ModelError;

/// Errors that can occur while reading sessions or handling tokens.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Token verification failed: bad signature, malformed token, or
    /// the expiry has passed.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// No live session exists for this username. Either it was never
    /// written or its TTL lapsed. Callers treat this as "no session",
    /// not as a system failure.
    #[error("no session for {0}")]
    NotFound(String),

    /// The cache backend failed.
    #[error("session cache: {0}")]
    Cache(#[from] CacheError),

    /// A cached session could not be encoded or decoded.
    #[error("session codec: {0}")]
    Codec(#[from] ModelError),

    /// Signing a token failed.
    #[error("token signing failed: {0}")]
    Signing(String),

    /// The token configuration is unusable (empty secret, validity out
    /// of range). Raised at construction, never per call.
    #[error("invalid token configuration: {0}")]
    InvalidConfig(String),
}
