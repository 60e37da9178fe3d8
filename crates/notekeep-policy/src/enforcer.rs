//! The authorization enforcer.
//!
//! Decisions read an immutable snapshot of the cached policy
//! (`Arc<PolicySet>` behind a short-lived read lock), so any number of
//! requests can be checked in parallel. Changes go through the store
//! first and then swap in a new snapshot; a separate async mutex keeps
//! changes and reloads from interleaving.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use notekeep_model::Role;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, trace};

use crate::{Grant, PolicyError, PolicySet, PolicyStore, Rule, action_matches, resource_matches};

/// Where the policy file lives and how often it is re-read.
#[derive(Debug, Clone)]
pub struct PolicyConfig {
    /// Default: `policy.json` in the working directory.
    pub path: PathBuf,
    /// Default: 60 seconds.
    pub reload_interval: Duration,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("policy.json"),
            reload_interval: Duration::from_secs(60),
        }
    }
}

/// Admits or denies `(subject, path, action)` against a cached policy.
///
/// ## Subjects and grants
///
/// ```text
///   alice ──grant──► user ◄──grant── admin
///                     │                 │
///              /notes, /media      /admin/*
/// ```
///
/// A subject may do whatever any subject it reaches through grants may
/// do. A freshly verified user has no grant until
/// [`grant_role`](Self::grant_role) runs, so until then every check for
/// them is denied.
pub struct Enforcer<S> {
    store: S,
    policy: RwLock<Arc<PolicySet>>,
    writes: tokio::sync::Mutex<()>,
}

impl<S: PolicyStore> Enforcer<S> {
    /// Loads the policy from `store` and starts enforcing it.
    pub async fn load(store: S) -> Result<Self, PolicyError> {
        let policy = store.load().await?;
        info!(
            rules = policy.rules.len(),
            grants = policy.grants.len(),
            "policy loaded"
        );
        Ok(Self {
            store,
            policy: RwLock::new(Arc::new(policy)),
            writes: tokio::sync::Mutex::new(()),
        })
    }

    /// Re-reads the store and replaces the cached policy. On failure the
    /// cached policy stays in force.
    pub async fn reload(&self) -> Result<(), PolicyError> {
        let _writing = self.writes.lock().await;
        let policy = self.store.load().await?;
        debug!(
            rules = policy.rules.len(),
            grants = policy.grants.len(),
            "policy reloaded"
        );
        self.replace(policy);
        Ok(())
    }

    /// Reloads the policy every `every` until the enforcer is dropped.
    ///
    /// Failed reloads are logged and the previous policy is kept.
    pub fn spawn_auto_reload(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let enforcer = Arc::downgrade(self);
        let every = every.max(Duration::from_millis(1));

        tokio::spawn(async move {
            let mut ticker = time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately; the policy is fresh.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(enforcer) = enforcer.upgrade() else {
                    break;
                };
                if let Err(e) = enforcer.reload().await {
                    error!(error = %e, "policy reload failed, keeping cached policy");
                }
            }
            debug!("policy auto-reload stopped");
        })
    }

    /// Decides for a role taken from a verified token. Roles inherit
    /// through grants (`admin` gets everything `user` has).
    pub fn enforce(&self, role: Role, path: &str, action: &str) -> bool {
        self.enforce_subject(role.as_str(), path, action)
    }

    /// Decides for any subject: a username, a role name, or anything
    /// else that appears in the policy.
    pub fn enforce_subject(&self, subject: &str, path: &str, action: &str) -> bool {
        let policy = self.snapshot();
        let subjects = reachable(&policy, subject);
        let allowed = policy.rules.iter().any(|rule| {
            subjects.contains(rule.subject.as_str())
                && resource_matches(&rule.resource, path)
                && action_matches(&rule.action, action)
        });
        trace!(subject, path, action, allowed, "policy decision");
        allowed
    }

    /// Grants `role` to `subject`, saving to the store before the cache.
    ///
    /// Returns `false` if the grant already existed.
    pub async fn grant_role(&self, subject: &str, role: Role) -> Result<bool, PolicyError> {
        let grant = Grant::new(subject, role.as_str());
        grant.check()?;

        let _writing = self.writes.lock().await;
        let (policy, added) = self.store.add_grant(grant).await?;
        self.replace(policy);

        if added {
            info!(subject, %role, "role granted");
        }
        Ok(added)
    }

    /// Adds a rule, saving to the store before the cache.
    ///
    /// Returns `false` if the rule already existed.
    pub async fn add_rule(&self, rule: Rule) -> Result<bool, PolicyError> {
        rule.check()?;

        let _writing = self.writes.lock().await;
        let (policy, added) = self.store.add_rule(rule.clone()).await?;
        self.replace(policy);

        if added {
            info!(subject = %rule.subject, resource = %rule.resource, action = %rule.action, "rule added");
        }
        Ok(added)
    }

    /// Everything `subject` inherits from, directly or transitively,
    /// sorted. Does not include `subject` itself.
    pub fn roles_for(&self, subject: &str) -> Vec<String> {
        let policy = self.snapshot();
        let mut roles: Vec<String> = reachable(&policy, subject)
            .into_iter()
            .filter(|s| *s != subject)
            .map(str::to_string)
            .collect();
        roles.sort();
        roles
    }

    /// The policy currently being enforced.
    pub fn snapshot(&self) -> Arc<PolicySet> {
        Arc::clone(&self.policy.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// The backing store.
    pub fn store(&self) -> &S {
        &self.store
    }

    fn replace(&self, policy: PolicySet) {
        *self.policy.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(policy);
    }
}

/// `subject` plus every subject reachable from it through grants.
/// Cycles in the grant graph are harmless.
fn reachable<'a>(policy: &'a PolicySet, subject: &'a str) -> HashSet<&'a str> {
    let mut seen = HashSet::from([subject]);
    let mut frontier = vec![subject];

    while let Some(current) = frontier.pop() {
        for grant in policy.grants.iter().filter(|g| g.subject == current) {
            if seen.insert(grant.role.as_str()) {
                frontier.push(grant.role.as_str());
            }
        }
    }
    seen
}
