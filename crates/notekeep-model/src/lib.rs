//! Shared data model for Notekeep.
//!
//! This crate defines the records that every other layer passes around:
//!
//! - **Types** ([`User`], [`Session`], [`Role`], [`VerificationCode`], etc.) —
//!   the identity and session records of the verification pipeline.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) — how records are turned
//!   into bytes before they reach a cache backend.
//! - **Errors** ([`ModelError`]) — what can go wrong while encoding,
//!   decoding, or parsing these records.
//!
//! # Architecture
//!
//! The model sits at the bottom of the stack. It knows nothing about
//! caches, mail, or policies:
//!
//! ```text
//! Identity (orchestrator) → Session / Mail / Policy → Model (records)
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ModelError;
pub use types::{Role, Session, User, UserId, VerificationCode};
