//! The policy document: rules and grants.

use notekeep_model::Role;
use serde::{Deserialize, Serialize};

use crate::PolicyError;

/// Allows `subject` to perform `action` on paths matching `resource`.
///
/// The subject is usually a role name (`user`, `admin`), but a rule may
/// name an individual user too.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rule {
    pub subject: String,
    pub resource: String,
    pub action: String,
}

impl Rule {
    pub fn new(
        subject: impl Into<String>,
        resource: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            resource: resource.into(),
            action: action.into(),
        }
    }

    pub(crate) fn check(&self) -> Result<(), PolicyError> {
        if self.subject.is_empty() || self.resource.is_empty() || self.action.is_empty() {
            return Err(PolicyError::Invalid(format!("{self:?} has an empty field")));
        }
        Ok(())
    }
}

/// Makes `subject` inherit every rule of `role`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Grant {
    pub subject: String,
    pub role: String,
}

impl Grant {
    pub fn new(subject: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            role: role.into(),
        }
    }

    pub(crate) fn check(&self) -> Result<(), PolicyError> {
        if self.subject.is_empty() || self.role.is_empty() {
            return Err(PolicyError::Invalid(format!("{self:?} has an empty field")));
        }
        Ok(())
    }
}

/// A complete policy: what the store persists and the enforcer caches.
///
/// Serialized as:
///
/// ```json
/// {
///   "rules":  [{ "subject": "user", "resource": "/notes/:id", "action": "*" }],
///   "grants": [{ "subject": "alice", "role": "user" }]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicySet {
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub grants: Vec<Grant>,
}

impl PolicySet {
    /// The policy a fresh deployment starts with: users own their notes
    /// and media, admins additionally manage `/admin/*` and inherit
    /// everything users can do.
    pub fn seed() -> Self {
        let user = Role::User.as_str();
        let admin = Role::Admin.as_str();
        Self {
            rules: vec![
                Rule::new(user, "/notes", "*"),
                Rule::new(user, "/notes/:id", "*"),
                Rule::new(user, "/media", "*"),
                Rule::new(user, "/media/:id", "*"),
                Rule::new(admin, "/admin/*", "*"),
            ],
            grants: vec![Grant::new(admin, user)],
        }
    }

    /// Adds `rule` unless an identical one exists. Returns whether it was added.
    pub fn insert_rule(&mut self, rule: Rule) -> bool {
        if self.rules.contains(&rule) {
            return false;
        }
        self.rules.push(rule);
        true
    }

    /// Adds `grant` unless an identical one exists. Returns whether it was added.
    pub fn insert_grant(&mut self, grant: Grant) -> bool {
        if self.grants.contains(&grant) {
            return false;
        }
        self.grants.push(grant);
        true
    }

    pub fn has_grant(&self, grant: &Grant) -> bool {
        self.grants.contains(grant)
    }
}
