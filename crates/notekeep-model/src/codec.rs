//! Codec trait and implementations for serializing records.
//!
//! A "codec" (coder/decoder) converts between Rust types and raw bytes.
//! Cache backends only store bytes, so the session store needs something
//! that implements [`Codec`] to put a [`Session`](crate::Session) in and
//! get it back out. Swapping JSON for a binary format later only means
//! adding another implementation.

use serde::{Serialize, de::DeserializeOwned};

use crate::ModelError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// ## Trait bounds
///
/// - `Send + Sync` → the codec is shared between request tasks and the
///   delivery worker, which Tokio may run on different threads.
/// - `'static` → the codec owns everything it needs, so it can live
///   inside long-lived components.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ModelError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ModelError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ModelError::Decode` if the bytes are malformed or don't
    /// match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ModelError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// JSON keeps cache entries readable when you inspect the backend by hand.
/// This is behind the `json` feature flag (enabled by default).
///
/// ## Example
///
/// ```rust
/// use notekeep_model::{Codec, JsonCodec, Role, Session, UserId, VerificationCode};
///
/// let codec = JsonCodec;
/// let session = Session::pending(
///     UserId(7),
///     "alice",
///     "alice@example.com",
///     Role::User,
///     VerificationCode::new(482913).unwrap(),
/// );
///
/// let bytes = codec.encode(&session).unwrap();
/// let decoded: Session = codec.decode(&bytes).unwrap();
/// assert_eq!(session, decoded);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ModelError> {
        serde_json::to_vec(value).map_err(ModelError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ModelError> {
        serde_json::from_slice(data).map_err(ModelError::Decode)
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;
    use crate::{Role, Session, UserId, VerificationCode};

    #[test]
    fn test_decode_garbage_returns_decode_error() {
        let result: Result<Session, _> = JsonCodec.decode(b"not json");
        assert!(matches!(result, Err(ModelError::Decode(_))));
    }

    #[test]
    fn test_decode_missing_field_returns_decode_error() {
        let result: Result<Session, _> =
            JsonCodec.decode(br#"{"user_id": 1, "username": "alice"}"#);
        assert!(matches!(result, Err(ModelError::Decode(_))));
    }

    #[test]
    fn test_encode_session_uses_role_name_and_plain_code() {
        let session = Session::pending(
            UserId(3),
            "bob",
            "bob@example.com",
            Role::User,
            VerificationCode::new(42).unwrap(),
        );

        let bytes = JsonCodec.encode(&session).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(json["role"], "user");
        assert_eq!(json["code"], 42);
        assert_eq!(json["is_verified"], false);
        assert_eq!(json["is_sent"], false);
    }
}
