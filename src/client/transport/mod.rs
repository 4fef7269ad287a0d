//! Transport between the stream client and the proxy
//!
//! The [`ChatTransport`] trait separates "talk to the proxy" from the
//! stream client's delivery logic:
//!
//! - [`http::HttpTransport`] -- reqwest-based transport used in production.
//! - [`fake::FakeTransport`] -- scripted in-process transport for tests.
//!
//! `open_stream` distinguishes a response whose body can be read
//! incrementally from one that cannot ([`StreamOpen::Unsupported`]); the
//! stream client remembers the latter and switches to the non-streaming
//! request plus simulated reveal.

// Public so the integration tests under tests/ can script the client
pub mod fake;
pub mod http;

use std::pin::Pin;

use bytes::Bytes;
use futures::Stream;
use serde::Serialize;
use thiserror::Error;

use crate::error::{ChatError, GENERIC_PROXY_MESSAGE};
use crate::message::Message;

pub use http::HttpTransport;

/// Body sent to `POST /v1/chat`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProxyRequest {
    /// Conversation history including the new user turn
    pub messages: Vec<Message>,
    /// Opaque quota key
    #[serde(rename = "deviceId")]
    pub device_id: String,
    /// Whether incremental delivery is requested
    pub stream: bool,
}

/// Raw body chunks of a streaming response
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

/// Outcome of opening a streaming request
pub enum StreamOpen {
    /// The body can be read incrementally
    Streaming(ByteStream),
    /// The response arrived but its body cannot be read incrementally
    Unsupported,
}

impl std::fmt::Debug for StreamOpen {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamOpen::Streaming(_) => f.write_str("Streaming(..)"),
            StreamOpen::Unsupported => f.write_str("Unsupported"),
        }
    }
}

/// Transport-level failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// No response was received
    #[error("Network error: {0}")]
    Network(String),

    /// The proxy answered with a non-success status
    #[error("Proxy returned HTTP {status}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, used to extract the `{ error }` message
        body: String,
    },

    /// A success response whose body could not be interpreted
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Reading a started body failed
    #[error("Stream read failed: {0}")]
    Read(String),
}

impl From<TransportError> for ChatError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Network(_) => ChatError::Network,
            TransportError::Status { status, body } => ChatError::from_proxy_status(status, &body),
            TransportError::InvalidResponse(_) => ChatError::Proxy {
                status: 200,
                message: GENERIC_PROXY_MESSAGE.to_string(),
            },
            TransportError::Read(_) => ChatError::StreamInterrupted,
        }
    }
}

/// Connection to the proxy chat endpoint
#[async_trait::async_trait]
pub trait ChatTransport: Send + Sync {
    /// Issue a streaming request and expose its body for incremental reads
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Network`] when no response arrives and
    /// [`TransportError::Status`] for non-2xx responses.
    async fn open_stream(&self, request: &ProxyRequest) -> Result<StreamOpen, TransportError>;

    /// Issue a non-streaming request and return the reply text
    ///
    /// # Errors
    ///
    /// Same as [`ChatTransport::open_stream`], plus
    /// [`TransportError::InvalidResponse`] for an unreadable body.
    async fn complete(&self, request: &ProxyRequest) -> Result<String, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_uses_camel_case_device_id() {
        let request = ProxyRequest {
            messages: vec![Message::user("hi")],
            device_id: "abc".to_string(),
            stream: true,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["deviceId"], "abc");
        assert_eq!(value["stream"], true);
        assert!(value.get("device_id").is_none());
    }

    #[test]
    fn test_error_mapping() {
        assert_eq!(
            ChatError::from(TransportError::Network("refused".into())),
            ChatError::Network
        );
        assert_eq!(
            ChatError::from(TransportError::Status {
                status: 429,
                body: String::new()
            }),
            ChatError::QuotaExceeded
        );
        assert_eq!(
            ChatError::from(TransportError::Read("reset".into())),
            ChatError::StreamInterrupted
        );
        assert_eq!(
            ChatError::from(TransportError::Status {
                status: 502,
                body: r#"{"error":"AI service misconfigured"}"#.into()
            }),
            ChatError::Proxy {
                status: 502,
                message: "AI service misconfigured".into()
            }
        );
    }
}
