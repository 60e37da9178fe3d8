#![allow(async_fn_in_trait)]
//! Identity lifecycle for Notekeep.
//!
//! [`IdentityService`] ties the user store to the session store, the
//! token service, the verification delivery queue, and the policy
//! enforcer. It owns every state transition of an account: register,
//! verify, resend, login, profile edits, and (de)activation.

mod error;
mod password;
mod service;
mod store;
mod view;

pub use error::{IdentityError, StoreError};
pub use password::{PasswordConfig, PasswordHasher};
pub use service::{Authenticated, IdentityService, Registration, Verification};
pub use store::{MemoryUserStore, NewUser, ProfileUpdate, UserStore};
pub use view::UserView;
