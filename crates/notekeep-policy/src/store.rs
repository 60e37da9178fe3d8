//! Where the policy document lives.
//!
//! The store is the source of truth. The enforcer only caches what it
//! loaded, and every programmatic change is written here before the
//! cache sees it.

use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use crate::{Grant, PolicyError, PolicySet, Rule};

/// Loads and saves a [`PolicySet`].
pub trait PolicyStore: Send + Sync + 'static {
    /// Reads the current policy.
    fn load(&self) -> impl Future<Output = Result<PolicySet, PolicyError>> + Send;

    /// Replaces the stored policy with `policy`.
    fn save(&self, policy: &PolicySet) -> impl Future<Output = Result<(), PolicyError>> + Send;

    /// Adds a rule to what is currently stored (not to a cached copy).
    ///
    /// Returns the policy as stored afterwards and whether the rule was
    /// new. An existing identical rule is not written again.
    fn add_rule(
        &self,
        rule: Rule,
    ) -> impl Future<Output = Result<(PolicySet, bool), PolicyError>> + Send {
        async move {
            let mut policy = self.load().await?;
            let added = policy.insert_rule(rule);
            if added {
                self.save(&policy).await?;
            }
            Ok((policy, added))
        }
    }

    /// Adds a grant to what is currently stored. Same contract as
    /// [`add_rule`](Self::add_rule).
    fn add_grant(
        &self,
        grant: Grant,
    ) -> impl Future<Output = Result<(PolicySet, bool), PolicyError>> + Send {
        async move {
            let mut policy = self.load().await?;
            let added = policy.insert_grant(grant);
            if added {
                self.save(&policy).await?;
            }
            Ok((policy, added))
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryPolicyStore
// ---------------------------------------------------------------------------

/// Keeps the policy in process memory. For tests and development.
#[derive(Debug, Default)]
pub struct MemoryPolicyStore {
    policy: RwLock<PolicySet>,
}

impl MemoryPolicyStore {
    pub fn new(policy: PolicySet) -> Self {
        Self {
            policy: RwLock::new(policy),
        }
    }

    /// A store holding [`PolicySet::seed`].
    pub fn seeded() -> Self {
        Self::new(PolicySet::seed())
    }

    /// A copy of what is stored right now.
    pub fn snapshot(&self) -> PolicySet {
        self.policy
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl PolicyStore for MemoryPolicyStore {
    async fn load(&self) -> Result<PolicySet, PolicyError> {
        Ok(self.snapshot())
    }

    async fn save(&self, policy: &PolicySet) -> Result<(), PolicyError> {
        *self.policy.write().unwrap_or_else(PoisonError::into_inner) = policy.clone();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FilePolicyStore
// ---------------------------------------------------------------------------

/// Keeps the policy in a JSON file.
///
/// Saves go to a sibling temporary file that is then renamed over the
/// original, so a reader never sees a half-written document.
#[derive(Debug, Clone)]
pub struct FilePolicyStore {
    path: PathBuf,
}

impl FilePolicyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Opens `path`, writing [`PolicySet::seed`] there first if the file
    /// doesn't exist yet.
    pub async fn open_or_seed(path: impl Into<PathBuf>) -> Result<Self, PolicyError> {
        let store = Self::new(path);
        match tokio::fs::metadata(&store.path).await {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!(path = %store.path.display(), "policy file missing, writing default policy");
                store.save(&PolicySet::seed()).await?;
            }
            Err(source) => {
                return Err(PolicyError::Io {
                    path: store.path.clone(),
                    source,
                });
            }
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> PolicyError {
        PolicyError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl PolicyStore for FilePolicyStore {
    async fn load(&self) -> Result<PolicySet, PolicyError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| self.io_error(e))?;

        serde_json::from_str(&content).map_err(|source| PolicyError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    async fn save(&self, policy: &PolicySet) -> Result<(), PolicyError> {
        let json = serde_json::to_vec_pretty(policy).map_err(PolicyError::Encode)?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, json).await.map_err(|e| self.io_error(e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.io_error(e))
    }
}
