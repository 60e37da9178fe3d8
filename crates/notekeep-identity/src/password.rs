//! One-way password hashing with Argon2id.
//!
//! Hashes are PHC strings (`$argon2id$v=19$m=...,t=...,p=...$salt$hash`),
//! so the parameters and the per-call random salt travel with the hash
//! and verification keeps working after the cost settings change.
//!
//! Hashing is deliberately slow. Both operations run on Tokio's blocking
//! pool so they never stall the request tasks sharing a worker thread.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};

use crate::IdentityError;

/// Argon2id cost settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordConfig {
    /// Memory cost in KiB. Default: 19 456 (19 MiB).
    pub memory_kib: u32,
    /// Number of passes. Default: 2.
    pub iterations: u32,
    /// Lanes. Default: 1.
    pub parallelism: u32,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            memory_kib: 19_456,
            iterations: 2,
            parallelism: 1,
        }
    }
}

impl PasswordConfig {
    /// The cheapest settings Argon2 accepts. Only for tests.
    pub fn insecure_fast() -> Self {
        Self {
            memory_kib: Params::MIN_M_COST,
            iterations: 1,
            parallelism: 1,
        }
    }
}

/// Hashes and verifies account secrets.
#[derive(Clone)]
pub struct PasswordHasher {
    argon2: Argon2<'static>,
}

impl PasswordHasher {
    /// # Errors
    /// [`IdentityError::Internal`] if the cost settings are out of range.
    pub fn new(config: &PasswordConfig) -> Result<Self, IdentityError> {
        let params = Params::new(config.memory_kib, config.iterations, config.parallelism, None)
            .map_err(|e| IdentityError::internal("password config", e))?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// Hashes `secret` with a fresh random salt.
    pub async fn hash(&self, secret: &str) -> Result<String, IdentityError> {
        let argon2 = self.argon2.clone();
        let secret = secret.to_owned();

        tokio::task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            argon2
                .hash_password(secret.as_bytes(), &salt)
                .map(|hash| hash.to_string())
                .map_err(|e| IdentityError::internal("hash password", e))
        })
        .await
        .map_err(|e| IdentityError::internal("hash password", e))?
    }

    /// Returns whether `secret` matches `hash`.
    ///
    /// A malformed stored hash is an internal error, not a mismatch.
    pub async fn verify(&self, secret: &str, hash: &str) -> Result<bool, IdentityError> {
        let argon2 = self.argon2.clone();
        let secret = secret.to_owned();
        let hash = hash.to_owned();

        tokio::task::spawn_blocking(move || {
            let parsed =
                PasswordHash::new(&hash).map_err(|e| IdentityError::internal("parse password hash", e))?;
            Ok(argon2.verify_password(secret.as_bytes(), &parsed).is_ok())
        })
        .await
        .map_err(|e| IdentityError::internal("verify password", e))?
    }
}

impl std::fmt::Debug for PasswordHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordHasher").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> PasswordHasher {
        PasswordHasher::new(&PasswordConfig::insecure_fast()).unwrap()
    }

    #[tokio::test]
    async fn test_hash_then_verify_accepts_correct_secret() {
        let hasher = hasher();
        let hash = hasher.hash("correct horse").await.unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(hasher.verify("correct horse", &hash).await.unwrap());
        assert!(!hasher.verify("battery staple", &hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_hash_uses_fresh_salt_each_call() {
        let hasher = hasher();
        let a = hasher.hash("same").await.unwrap();
        let b = hasher.hash("same").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_verify_with_other_cost_settings_still_works() {
        let hash = hasher().hash("pw").await.unwrap();
        let stronger = PasswordHasher::new(&PasswordConfig {
            iterations: 3,
            ..PasswordConfig::insecure_fast()
        })
        .unwrap();

        assert!(stronger.verify("pw", &hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_verify_malformed_hash_returns_internal() {
        let result = hasher().verify("pw", "not-a-phc-string").await;
        assert!(matches!(result, Err(IdentityError::Internal(_))));
    }

    #[test]
    fn test_new_rejects_zero_iterations() {
        let result = PasswordHasher::new(&PasswordConfig {
            iterations: 0,
            ..PasswordConfig::default()
        });
        assert!(matches!(result, Err(IdentityError::Internal(_))));
    }
}
