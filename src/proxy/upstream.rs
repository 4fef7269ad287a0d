//! Upstream language-model provider client
//!
//! Speaks the Anthropic Messages API: the system directive, the client's
//! conversation and the incremental-delivery flag go out; the response is
//! either piped through untouched (streaming) or reduced to its text.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::config::UpstreamConfig;
use crate::error::{NoorError, Result};
use crate::message::Message;
use crate::proxy::error::ProxyError;
use crate::proxy::{metrics, prompt};

/// Request body for `POST /v1/messages`
#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: &'a [Message],
    stream: bool,
}

/// Non-streaming response body; only text blocks are of interest
#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// Maps a non-success upstream status to the error shown to clients
///
/// # Examples
///
/// ```
/// use noor::proxy::upstream::map_upstream_status;
/// use noor::proxy::ProxyError;
///
/// assert_eq!(map_upstream_status(401), ProxyError::UpstreamMisconfigured);
/// assert_eq!(map_upstream_status(529), ProxyError::UpstreamBusy);
/// assert_eq!(map_upstream_status(404), ProxyError::UpstreamStatus(404));
/// ```
pub fn map_upstream_status(status: u16) -> ProxyError {
    match status {
        401 | 403 => ProxyError::UpstreamMisconfigured,
        429 | 500..=599 => ProxyError::UpstreamBusy,
        other => ProxyError::UpstreamStatus(other),
    }
}

/// HTTP client for the upstream provider
pub struct UpstreamClient {
    client: Client,
    config: UpstreamConfig,
}

impl UpstreamClient {
    /// Creates a client for the configured provider
    ///
    /// A missing credential is accepted here and reported per request.
    ///
    /// # Errors
    ///
    /// Returns `NoorError::Config` if the HTTP client cannot be built
    pub fn new(config: UpstreamConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(concat!("noor/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| NoorError::Config(format!("Failed to create HTTP client: {}", e)))?;

        if config.api_key.is_none() {
            tracing::warn!("No upstream API key configured; chat requests will fail with 502");
        }

        tracing::info!(
            "Initialized upstream client: base={}, model={}",
            config.api_base,
            config.model
        );

        Ok(Self { client, config })
    }

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.config.api_base.trim_end_matches('/'))
    }

    /// Sends the conversation upstream and returns the successful response
    ///
    /// Streaming requests have no total timeout so long replies are not cut
    /// off; non-streaming requests are bounded by `timeout_seconds`.
    ///
    /// # Errors
    ///
    /// Returns the [`ProxyError`] to send back to the client. Upstream error
    /// bodies are logged and dropped.
    pub async fn send(
        &self,
        messages: &[Message],
        stream: bool,
    ) -> std::result::Result<reqwest::Response, ProxyError> {
        let api_key = self.config.api_key.as_deref().ok_or_else(|| {
            tracing::error!("Upstream API key is not configured");
            ProxyError::UpstreamMisconfigured
        })?;

        let body = MessagesRequest {
            model: &self.config.model,
            max_tokens: self.config.max_tokens,
            system: prompt::system_directive(),
            messages,
            stream,
        };

        let mut request = self
            .client
            .post(self.messages_url())
            .header("x-api-key", api_key)
            .header("anthropic-version", &self.config.api_version)
            .header("content-type", "application/json")
            .json(&body);

        if stream {
            request = request.header("accept", "text/event-stream");
        } else {
            request = request.timeout(Duration::from_secs(self.config.timeout_seconds));
        }

        let started = Instant::now();
        let response = request.send().await.map_err(|e| {
            tracing::error!("Failed to reach upstream: {}", e);
            ProxyError::UpstreamUnreachable
        })?;
        metrics::record_upstream_latency(started.elapsed());

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!(
                status = status.as_u16(),
                "Upstream returned error {}: {}",
                status,
                error_text
            );
            return Err(map_upstream_status(status.as_u16()));
        }

        tracing::debug!(status = status.as_u16(), stream, "Upstream accepted request");
        Ok(response)
    }

    /// Sends a non-streaming request and returns the concatenated text blocks
    ///
    /// # Errors
    ///
    /// Same as [`UpstreamClient::send`], plus
    /// [`ProxyError::UpstreamInvalidResponse`] when the body is not a
    /// messages response.
    pub async fn complete(&self, messages: &[Message]) -> std::result::Result<String, ProxyError> {
        let response = self.send(messages, false).await?;
        let bytes = response.bytes().await.map_err(|e| {
            tracing::error!("Failed to read upstream response: {}", e);
            ProxyError::UpstreamUnreachable
        })?;
        let parsed: MessagesResponse = serde_json::from_slice(&bytes).map_err(|e| {
            tracing::error!("Failed to parse upstream response: {}", e);
            ProxyError::UpstreamInvalidResponse
        })?;
        Ok(collect_text(&parsed))
    }
}

fn collect_text(response: &MessagesResponse) -> String {
    response
        .content
        .iter()
        .filter(|block| block.kind == "text")
        .filter_map(|block| block.text.as_deref())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    #[test]
    fn test_status_mapping_covers_ranges() {
        assert_eq!(map_upstream_status(403), ProxyError::UpstreamMisconfigured);
        assert_eq!(map_upstream_status(429), ProxyError::UpstreamBusy);
        assert_eq!(map_upstream_status(500), ProxyError::UpstreamBusy);
        assert_eq!(map_upstream_status(503), ProxyError::UpstreamBusy);
        assert_eq!(map_upstream_status(400), ProxyError::UpstreamStatus(400));
        assert_eq!(map_upstream_status(302), ProxyError::UpstreamStatus(302));
    }

    #[test]
    fn test_collect_text_skips_non_text_blocks() {
        let parsed: MessagesResponse = serde_json::from_str(
            r#"{"content":[
                {"type":"text","text":"Peace "},
                {"type":"tool_use","id":"x"},
                {"type":"text","text":"be upon you"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(collect_text(&parsed), "Peace be upon you");
    }

    #[test]
    fn test_request_body_shape() {
        let messages = vec![Message::user("Salaam")];
        let body = MessagesRequest {
            model: "m",
            max_tokens: 10,
            system: "sys",
            messages: &messages,
            stream: true,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["system"], "sys");
        assert_eq!(value["stream"], true);
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["messages"][0]["content"], "Salaam");
    }

    #[test]
    fn test_messages_url_trims_trailing_slash() {
        let config = UpstreamConfig {
            api_base: "http://localhost:9999/".to_string(),
            ..Default::default()
        };
        let client = UpstreamClient::new(config).unwrap();
        assert_eq!(client.messages_url(), "http://localhost:9999/v1/messages");
    }

    #[tokio::test]
    async fn test_missing_key_is_misconfigured() {
        let client = UpstreamClient::new(UpstreamConfig::default()).unwrap();
        let err = client.send(&[Message::user("hi")], true).await.unwrap_err();
        assert_eq!(err, ProxyError::UpstreamMisconfigured);
    }
}
