//! Session state and identity tokens for Notekeep.
//!
//! This crate handles the two ways the pipeline remembers who a user is:
//!
//! 1. **Session tracking** — a TTL-bound record per username holding the
//!    pending verification code and the verified/sent/active flags
//!    ([`SessionStore`]).
//! 2. **Tokens** — signed, time-limited claims handed to clients as
//!    bearer credentials ([`TokenService`], [`Authenticator`]).
//!
//! # How it fits in the stack
//!
//! ```text
//! Identity / Mail (above)  ← read and promote session state, issue tokens
//!     ↕
//! Session Layer (this crate)  ← per-key consistent session records, token signing
//!     ↕
//! Cache + Model (below)  ← bytes with TTL, Session/Role types, codec
//! ```

#![allow(async_fn_in_trait)]

mod auth;
mod error;
mod session;
mod store;
mod token;

pub use auth::{Authenticator, bearer_token};
pub use error::SessionError;
pub use session::SessionConfig;
pub use store::SessionStore;
pub use token::{Claims, Clock, FixedClock, SystemClock, TokenConfig, TokenService};
