//! Error types for Noor
//!
//! This module defines the crate-wide error type used by configuration,
//! storage and credential handling, plus the client-facing [`ChatError`]
//! taxonomy surfaced through `StreamHandler::on_error`.

use thiserror::Error;

/// Main error type for Noor operations
///
/// Covers configuration loading, quota storage, device identity persistence
/// and the transport plumbing shared by the proxy and the client.
#[derive(Error, Debug)]
pub enum NoorError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Quota counter or local mirror storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Device identity could not be resolved or persisted
    #[error("Identity error: {0}")]
    Identity(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Keyring/credential storage errors
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    /// SQLite errors from the server-side quota store
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// sled errors from the client-side quota mirror
    #[error("Local store error: {0}")]
    LocalStore(#[from] sled::Error),
}

/// Result type alias for Noor operations
///
/// Uses `anyhow::Error` so callers can attach context while still being able
/// to downcast to [`NoorError`].
pub type Result<T> = anyhow::Result<T>;

/// User-facing message for a quota block, local or server-side.
pub const QUOTA_MESSAGE: &str =
    "You've reached today's message limit. Please try again tomorrow.";

/// User-facing message when no response could be obtained at all.
pub const NETWORK_MESSAGE: &str =
    "Unable to reach the assistant. Check your connection and try again.";

/// User-facing message when the proxy returned an error without a body.
pub const GENERIC_PROXY_MESSAGE: &str = "Something went wrong. Please try again.";

/// User-facing message when a started stream broke.
pub const INTERRUPTED_MESSAGE: &str = "Connection interrupted. Please try again.";

/// Failures a chat turn can end with
///
/// User cancellation is deliberately absent: a cancelled turn completes
/// with whatever text arrived before the cancel.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    /// The daily message quota is used up (local pre-check or proxy 429)
    #[error("{}", QUOTA_MESSAGE)]
    QuotaExceeded,

    /// No response was received (connectivity, DNS, refused connection)
    #[error("{}", NETWORK_MESSAGE)]
    Network,

    /// The proxy answered with a non-success status
    #[error("{message}")]
    Proxy {
        /// HTTP status returned by the proxy
        status: u16,
        /// Message taken from the proxy's `{ error }` body, or a generic one
        message: String,
    },

    /// The transport failed after the response had started streaming
    #[error("{}", INTERRUPTED_MESSAGE)]
    StreamInterrupted,
}

impl ChatError {
    /// Build the error for a non-2xx proxy response.
    ///
    /// A 429 always maps to [`ChatError::QuotaExceeded`] regardless of the
    /// body; otherwise the proxy's `{ error }` message is used when present.
    pub fn from_proxy_status(status: u16, body: &str) -> Self {
        if status == 429 {
            return ChatError::QuotaExceeded;
        }

        let message = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| GENERIC_PROXY_MESSAGE.to_string());

        ChatError::Proxy { status, message }
    }
}
