//! The mail transport seam and its HTTP implementation.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "http")]
use serde::Serialize;

use crate::MailError;

/// One outgoing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub to: String,
    pub to_name: Option<String>,
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Sends a single message and reports success or failure.
///
/// There are no delivery receipts: `Ok(())` means the provider accepted
/// the message, nothing more. Implementations bound their own I/O time.
pub trait MailTransport: Send + Sync + 'static {
    fn send(&self, email: &Email) -> impl Future<Output = Result<(), MailError>> + Send;
}

impl<T: MailTransport> MailTransport for Arc<T> {
    async fn send(&self, email: &Email) -> Result<(), MailError> {
        (**self).send(email).await
    }
}

// ---------------------------------------------------------------------------
// MailConfig
// ---------------------------------------------------------------------------

/// Settings for the HTTP mail API.
#[derive(Clone)]
pub struct MailConfig {
    /// Full URL of the send endpoint.
    ///
    /// Default: `https://api.brevo.com/v3/smtp/email`.
    pub endpoint: String,

    /// Sent in the `api-key` header.
    pub api_key: String,

    pub sender_email: String,

    /// Display name for the sender. Omitted from the payload when `None`.
    pub sender_name: Option<String>,

    /// Per-request I/O timeout. A timed out request counts as a failed
    /// attempt and is retried by the queue.
    ///
    /// Default: 10 seconds.
    pub timeout: Duration,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.brevo.com/v3/smtp/email".to_string(),
            api_key: String::new(),
            sender_email: String::new(),
            sender_name: None,
            timeout: Duration::from_secs(10),
        }
    }
}

impl fmt::Debug for MailConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .field("sender_email", &self.sender_email)
            .field("sender_name", &self.sender_name)
            .field("timeout", &self.timeout)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Wire payload
// ---------------------------------------------------------------------------

#[cfg(feature = "http")]
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Address<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[cfg(feature = "http")]
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendBody<'a> {
    sender: Address<'a>,
    to: Vec<Address<'a>>,
    subject: &'a str,
    html_content: &'a str,
    text_content: &'a str,
}

#[cfg(feature = "http")]
impl<'a> SendBody<'a> {
    fn new(config: &'a MailConfig, email: &'a Email) -> Self {
        Self {
            sender: Address {
                email: &config.sender_email,
                name: config.sender_name.as_deref(),
            },
            to: vec![Address {
                email: &email.to,
                name: email.to_name.as_deref(),
            }],
            subject: &email.subject,
            html_content: &email.html,
            text_content: &email.text,
        }
    }
}

// ---------------------------------------------------------------------------
// HttpMailTransport
// ---------------------------------------------------------------------------

/// Posts messages to a JSON mail API (Brevo's transactional endpoint
/// shape).
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct HttpMailTransport {
    client: reqwest::Client,
    config: MailConfig,
}

#[cfg(feature = "http")]
impl HttpMailTransport {
    /// Builds a client with the configured timeout.
    ///
    /// # Errors
    /// [`MailError::Config`] if the API key or sender address is blank.
    pub fn new(config: MailConfig) -> Result<Self, MailError> {
        if config.api_key.trim().is_empty() {
            return Err(MailError::Config("api key is required".into()));
        }
        if config.sender_email.trim().is_empty() {
            return Err(MailError::Config("sender email is required".into()));
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("notekeep/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| MailError::Config(e.to_string()))?;

        Ok(Self { client, config })
    }
}

#[cfg(feature = "http")]
impl MailTransport for HttpMailTransport {
    async fn send(&self, email: &Email) -> Result<(), MailError> {
        let response = self
            .client
            .post(&self.config.endpoint)
            .header("api-key", &self.config.api_key)
            .header("accept", "application/json")
            .json(&SendBody::new(&self.config, email))
            .send()
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(to = %email.to, status = status.as_u16(), "mail API accepted message");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(MailError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}
