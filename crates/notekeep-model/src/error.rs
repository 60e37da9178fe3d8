//! Error types for the model layer.
//!
//! Each crate in Notekeep defines its own error enum. When you see a
//! `ModelError`, the problem is in turning records into bytes (or back),
//! or in parsing a value that arrived as text.

/// Errors that can occur in the model layer.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// Serialization failed (turning a record into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a record).
    ///
    /// Common causes: a cache entry written by an older schema, or
    /// truncated bytes from a misbehaving backend.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// A role name or id that has no [`Role`](crate::Role) variant.
    #[error("unknown role: {0}")]
    UnknownRole(String),

    /// A verification code that is not a number in `0..=999999`.
    #[error("malformed verification code: {0}")]
    MalformedCode(String),
}
