//! # Notekeep
//!
//! Identity verification and session pipeline.
//!
//! A registration returns a signed token at once while a background
//! worker emails a six-digit verification code. Submitting the code
//! verifies the account and grants it the `user` role, after which the
//! policy enforcer admits its requests. Sessions live in a TTL cache keyed
//! by username.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use notekeep::prelude::*;
//!
//! # async fn run() -> Result<(), NotekeepError> {
//! let config = AppConfig::from_env()?;
//! let transport = HttpMailTransport::new(config.mail.clone())?;
//! let policy = FilePolicyStore::open_or_seed(&config.policy.path).await?;
//!
//! let app = Notekeep::builder()
//!     .config(config)
//!     .build(MemoryUserStore::new(), MemoryCache::new(), transport, policy)
//!     .await?;
//!
//! let claims = app.authorize(Some("Bearer eyJ..."), "/notes/:id", "GET").await?;
//! # let _ = claims;
//! # Ok(())
//! # }
//! ```

mod app;
mod config;
mod error;

pub use app::{Notekeep, NotekeepBuilder};
pub use config::AppConfig;
pub use error::NotekeepError;

/// Convenient re-exports for building and driving the pipeline.
pub mod prelude {
    pub use crate::{AppConfig, Notekeep, NotekeepBuilder, NotekeepError};

    pub use notekeep_cache::{CacheBackend, MemoryCache};
    pub use notekeep_identity::{
        Authenticated, IdentityError, IdentityService, MemoryUserStore, PasswordConfig,
        ProfileUpdate, Registration, UserStore, UserView, Verification,
    };
    pub use notekeep_mail::{
        DeliveryQueue, Email, HttpMailTransport, MailConfig, MailError, MailTransport, QueueStats,
        RetryPolicy,
    };
    pub use notekeep_model::{Role, Session, User, UserId, VerificationCode};
    pub use notekeep_policy::{
        Enforcer, FilePolicyStore, MemoryPolicyStore, PolicyConfig, PolicyStore, Rule,
    };
    pub use notekeep_session::{
        Authenticator, Claims, Clock, FixedClock, SessionConfig, SessionStore, SystemClock,
        TokenConfig, TokenService,
    };
}
