//! HTTP handlers for the proxy

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use crate::message::{Message, Role};
use crate::proxy::error::ProxyError;
use crate::proxy::{metrics, AppState};
use crate::quota::QuotaDecision;

/// A validated chat request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    /// Conversation so far, oldest first
    pub messages: Vec<Message>,
    /// Opaque quota key
    pub device_id: String,
    /// Whether the client wants incremental delivery
    pub stream: bool,
}

/// Validates a raw request body
///
/// Works on an untyped JSON value so every malformed input yields a 400
/// with a readable message instead of an extractor rejection.
///
/// # Errors
///
/// Returns [`ProxyError::Validation`] describing the first problem found.
pub fn validate_request(body: &[u8]) -> std::result::Result<ChatRequest, ProxyError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|_| ProxyError::Validation("Request body must be valid JSON".into()))?;

    let object = value
        .as_object()
        .ok_or_else(|| ProxyError::Validation("Request body must be a JSON object".into()))?;

    let raw_messages = object
        .get("messages")
        .and_then(Value::as_array)
        .filter(|m| !m.is_empty())
        .ok_or_else(|| ProxyError::Validation("messages must be a non-empty array".into()))?;

    let mut messages = Vec::with_capacity(raw_messages.len());
    for (index, raw) in raw_messages.iter().enumerate() {
        let role = match raw.get("role").and_then(Value::as_str) {
            Some("user") => Role::User,
            Some("assistant") => Role::Assistant,
            _ => {
                return Err(ProxyError::Validation(format!(
                    "messages[{}].role must be \"user\" or \"assistant\"",
                    index
                )))
            }
        };
        let content = raw
            .get("content")
            .and_then(Value::as_str)
            // Whitespace-only content is rejected the same as empty
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| {
                ProxyError::Validation(format!(
                    "messages[{}].content must be a non-empty string",
                    index
                ))
            })?;
        messages.push(Message {
            role,
            content: content.to_string(),
        });
    }

    let device_id = object
        .get("deviceId")
        .and_then(Value::as_str)
        // Whitespace-only ids are rejected the same as empty
        .filter(|d| !d.trim().is_empty())
        .ok_or_else(|| ProxyError::Validation("deviceId must be a non-empty string".into()))?;

    let stream = match object.get("stream") {
        None | Some(Value::Null) => true,
        Some(Value::Bool(flag)) => *flag,
        Some(_) => {
            return Err(ProxyError::Validation(
                "stream must be a boolean when present".into(),
            ))
        }
    };

    Ok(ChatRequest {
        messages,
        device_id: device_id.to_string(),
        stream,
    })
}

#[derive(Serialize)]
struct CompletionBody {
    text: String,
}

/// `POST /v1/chat`
pub async fn chat(
    State(state): State<AppState>,
    body: Bytes,
) -> std::result::Result<Response, ProxyError> {
    let request = validate_request(&body).map_err(|e| {
        tracing::debug!("Rejected invalid chat request: {}", e);
        e
    })?;
    metrics::record_request(request.stream);

    let today = Utc::now().date_naive();
    match state.limiter.check(&request.device_id, today).await {
        QuotaDecision::Exceeded { count } => {
            metrics::record_quota_rejection();
            tracing::info!(
                device_id = %request.device_id,
                count,
                "Daily quota exceeded"
            );
            return Err(ProxyError::QuotaExceeded);
        }
        QuotaDecision::Allowed { count } => {
            tracing::debug!(device_id = %request.device_id, count, "Quota check passed");
        }
        QuotaDecision::DegradedOpen => {}
    }

    let result = if request.stream {
        state
            .upstream
            .send(&request.messages, true)
            .await
            .map(stream_response)
    } else {
        state
            .upstream
            .complete(&request.messages)
            .await
            .map(|text| (StatusCode::OK, Json(CompletionBody { text })).into_response())
    };

    result.map_err(|e| {
        if let Some(kind) = e.upstream_kind() {
            metrics::record_upstream_error(kind);
        }
        e
    })
}

fn stream_response(upstream: reqwest::Response) -> Response {
    let headers = [
        (header::CONTENT_TYPE, "text/event-stream"),
        (header::CACHE_CONTROL, "no-cache, no-transform"),
        (header::CONNECTION, "keep-alive"),
        (HeaderName::from_static("x-accel-buffering"), "no"),
    ];
    (
        StatusCode::OK,
        headers,
        Body::from_stream(upstream.bytes_stream()),
    )
        .into_response()
}

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthBody {
        status: "ok",
        service: "noor-proxy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validate(body: &str) -> std::result::Result<ChatRequest, ProxyError> {
        validate_request(body.as_bytes())
    }

    #[test]
    fn test_valid_request_defaults_to_streaming() {
        let request = validate(
            r#"{"messages":[{"role":"user","content":"Salaam"}],"deviceId":"dev-1"}"#,
        )
        .unwrap();
        assert!(request.stream);
        assert_eq!(request.device_id, "dev-1");
        assert_eq!(request.messages, vec![Message::user("Salaam")]);
    }

    #[test]
    fn test_stream_false_is_honoured() {
        let request = validate(
            r#"{"messages":[{"role":"user","content":"hi"}],"deviceId":"d","stream":false}"#,
        )
        .unwrap();
        assert!(!request.stream);
    }

    #[test]
    fn test_rejects_malformed_json() {
        assert!(matches!(
            validate("{not json"),
            Err(ProxyError::Validation(_))
        ));
    }

    #[test]
    fn test_rejects_empty_messages() {
        assert!(validate(r#"{"messages":[],"deviceId":"d"}"#).is_err());
    }

    #[test]
    fn test_rejects_system_role() {
        let err = validate(r#"{"messages":[{"role":"system","content":"x"}],"deviceId":"d"}"#)
            .unwrap_err();
        assert!(err.to_string().contains("role"));
    }

    #[test]
    fn test_rejects_blank_content() {
        assert!(
            validate(r#"{"messages":[{"role":"user","content":"  "}],"deviceId":"d"}"#).is_err()
        );
        assert!(
            validate(r#"{"messages":[{"role":"user","content":"\n\t "}],"deviceId":"d"}"#).is_err()
        );
        assert!(validate(r#"{"messages":[{"role":"user","content":5}],"deviceId":"d"}"#).is_err());
    }

    #[test]
    fn test_rejects_missing_device_id() {
        assert!(validate(r#"{"messages":[{"role":"user","content":"x"}]}"#).is_err());
        assert!(
            validate(r#"{"messages":[{"role":"user","content":"x"}],"deviceId":""}"#).is_err()
        );
        assert!(
            validate(r#"{"messages":[{"role":"user","content":"x"}],"deviceId":" \t"}"#).is_err()
        );
    }

    #[test]
    fn test_rejects_non_boolean_stream() {
        assert!(validate(
            r#"{"messages":[{"role":"user","content":"x"}],"deviceId":"d","stream":"yes"}"#
        )
        .is_err());
    }
}
