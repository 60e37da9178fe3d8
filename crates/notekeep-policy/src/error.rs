//! Error types for the policy layer.

use std::path::PathBuf;

/// Errors from loading, saving, or changing the policy.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    /// The policy file could not be read or written.
    #[error("policy file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The policy file is not a valid policy document.
    #[error("failed to parse policy file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The policy could not be serialized for saving.
    #[error("failed to encode policy: {0}")]
    Encode(#[source] serde_json::Error),

    /// A rule or grant with an empty field was rejected.
    #[error("invalid policy entry: {0}")]
    Invalid(String),
}
