//! Verification email delivery for Notekeep.
//!
//! Registration hands a freshly created session to the
//! [`DeliveryQueue`] and returns immediately. A single background
//! worker then mails the one-time code and, once the mail API accepts
//! it, records `sent = true` in the session store.
//!
//! # Key types
//!
//! - [`DeliveryQueue`] — handle to the worker: enqueue, stats, shutdown
//! - [`RetryPolicy`] — backoff curve and dead-letter threshold
//! - [`MailTransport`] — the send-one-message seam
//! - [`HttpMailTransport`] — a JSON mail API client (feature `http`)
//!
//! # Ticket lifecycle
//!
//! ```text
//!            enqueue
//!               │
//!               ▼
//!  ┌────────► Pending ──send ok──► Dispatched ──mark_sent ok──► delivered
//!  │            │                     │    │
//!  │       send failed          write failed  session expired ──► dropped
//!  │            │                     │
//!  └── backoff ─┴─────────────────────┘
//!                │
//!        max_attempts reached ──► dead letter
//! ```

#![allow(async_fn_in_trait)]

mod error;
mod message;
mod queue;
mod retry;
mod transport;

pub use error::MailError;
pub use message::verification_email;
pub use queue::{DeadLetter, DeliveryQueue, QueueStats};
pub use retry::RetryPolicy;
#[cfg(feature = "http")]
pub use transport::HttpMailTransport;
pub use transport::{Email, MailConfig, MailTransport};
