//! reqwest transport to the proxy

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;

use super::{ChatTransport, ProxyRequest, StreamOpen, TransportError};
use crate::config::ClientConfig;
use crate::error::{NoorError, Result};

#[derive(Debug, Deserialize)]
struct CompletionBody {
    text: String,
}

/// HTTP transport for `POST /v1/chat`
///
/// # Examples
///
/// ```
/// use noor::client::transport::HttpTransport;
/// use noor::config::ClientConfig;
///
/// let transport = HttpTransport::new(&ClientConfig::default());
/// assert!(transport.is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    endpoint: String,
    incremental_reads: bool,
}

impl HttpTransport {
    /// Creates a transport for the configured endpoint
    ///
    /// # Errors
    ///
    /// Returns `NoorError::Config` if the HTTP client cannot be built
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .user_agent(concat!("noor/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| NoorError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            incremental_reads: config.incremental_reads,
        })
    }

    async fn post(
        &self,
        request: &ProxyRequest,
        accept: &str,
    ) -> std::result::Result<reqwest::Response, TransportError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Accept", accept)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!("Failed to reach proxy: {}", e);
                TransportError::Network(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "Proxy returned error");
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }
}

fn is_event_stream(response: &reqwest::Response) -> bool {
    response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim_start().to_ascii_lowercase().starts_with("text/event-stream"))
        .unwrap_or(false)
}

#[async_trait]
impl ChatTransport for HttpTransport {
    /// Streams the response body when the proxy answers with `text/event-stream`
    ///
    /// With incremental reads disabled in configuration no request is made
    /// and [`StreamOpen::Unsupported`] is returned straight away.
    async fn open_stream(
        &self,
        request: &ProxyRequest,
    ) -> std::result::Result<StreamOpen, TransportError> {
        if !self.incremental_reads {
            return Ok(StreamOpen::Unsupported);
        }

        let response = self.post(request, "text/event-stream").await?;

        if !is_event_stream(&response) {
            tracing::info!("Proxy response is not an event stream; falling back to reveal");
            return Ok(StreamOpen::Unsupported);
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| TransportError::Read(e.to_string())));
        Ok(StreamOpen::Streaming(Box::pin(stream)))
    }

    async fn complete(&self, request: &ProxyRequest) -> std::result::Result<String, TransportError> {
        let response = self.post(request, "application/json").await?;
        // Headers already arrived, so a failed body read is an interruption
        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransportError::Read(e.to_string()))?;
        let body: CompletionBody = serde_json::from_slice(&bytes)
            .map_err(|e| TransportError::InvalidResponse(e.to_string()))?;
        Ok(body.text)
    }
}
