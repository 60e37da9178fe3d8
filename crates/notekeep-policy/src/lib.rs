//! Role-based authorization for Notekeep.
//!
//! A policy is a set of `(subject, resource, action)` rules plus
//! `subject → role` grants. The [`Enforcer`] keeps an in-memory copy of
//! the policy held by a [`PolicyStore`] and answers "may this subject do
//! this action on this path?" without touching the store.
//!
//! # Key types
//!
//! - [`Enforcer`] — decisions, grants, reloads
//! - [`PolicySet`], [`Rule`], [`Grant`] — the policy document
//! - [`PolicyStore`] — where the document lives
//!   ([`MemoryPolicyStore`], [`FilePolicyStore`])
//!
//! # Decision flow
//!
//! ```text
//! enforce_subject("alice", "/notes/7", "GET")
//!     │
//!     ├─ resolve grants: alice → user          (transitively)
//!     │
//!     └─ any rule (alice|user, pattern, verb) where
//!            pattern matches "/notes/7"  and  verb matches "GET"
//!            → allow,  otherwise deny
//! ```

#![allow(async_fn_in_trait)]

mod enforcer;
mod error;
mod model;
mod pattern;
mod store;

pub use enforcer::{Enforcer, PolicyConfig};
pub use error::PolicyError;
pub use model::{Grant, PolicySet, Rule};
pub use pattern::{action_matches, resource_matches};
pub use store::{FilePolicyStore, MemoryPolicyStore, PolicyStore};
