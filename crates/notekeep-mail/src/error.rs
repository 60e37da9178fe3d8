//! Error types for the mail layer.

/// Errors from mail transports and the delivery queue handle.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    /// The request never got an answer: connection refused, timeout,
    /// DNS failure.
    #[error("mail transport failed: {0}")]
    Transport(String),

    /// The mail API answered with a non-success status.
    #[error("mail API rejected the message (status {status}): {body}")]
    Rejected { status: u16, body: String },

    /// The transport is missing required settings.
    #[error("mail transport misconfigured: {0}")]
    Config(String),

    /// The delivery worker has stopped and can take no more commands.
    #[error("delivery queue is shut down")]
    QueueClosed,
}
