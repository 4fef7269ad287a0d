//! Proxy error responses
//!
//! Every failure the proxy reports is a status code plus a JSON `{ error }`
//! body with a user-presentable message. Upstream bodies and credential
//! details never reach this type.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::error::QUOTA_MESSAGE;

/// Errors returned by the chat endpoint
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProxyError {
    /// The request body failed validation
    #[error("{0}")]
    Validation(String),

    /// The device has used up today's quota
    #[error("{}", QUOTA_MESSAGE)]
    QuotaExceeded,

    /// The upstream rejected our credential, or none is configured
    #[error("AI service misconfigured")]
    UpstreamMisconfigured,

    /// The upstream is rate limited or failing (429 / 5xx)
    #[error("AI service is busy, please try again")]
    UpstreamBusy,

    /// The upstream could not be contacted
    #[error("Failed to reach AI service")]
    UpstreamUnreachable,

    /// Any other non-success upstream status
    #[error("AI service error (status {0})")]
    UpstreamStatus(u16),

    /// The upstream answered 2xx with a body we could not interpret
    #[error("AI service returned an invalid response")]
    UpstreamInvalidResponse,
}

impl ProxyError {
    /// HTTP status sent to the client
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::Validation(_) => StatusCode::BAD_REQUEST,
            ProxyError::QuotaExceeded => StatusCode::TOO_MANY_REQUESTS,
            ProxyError::UpstreamBusy => StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::UpstreamMisconfigured
            | ProxyError::UpstreamUnreachable
            | ProxyError::UpstreamStatus(_)
            | ProxyError::UpstreamInvalidResponse => StatusCode::BAD_GATEWAY,
        }
    }

    /// Metric label for upstream failures, `None` for client-side errors
    pub fn upstream_kind(&self) -> Option<&'static str> {
        match self {
            ProxyError::UpstreamMisconfigured => Some("misconfigured"),
            ProxyError::UpstreamBusy => Some("busy"),
            ProxyError::UpstreamUnreachable => Some("unreachable"),
            ProxyError::UpstreamStatus(_) => Some("status"),
            ProxyError::UpstreamInvalidResponse => Some("invalid_response"),
            ProxyError::Validation(_) | ProxyError::QuotaExceeded => None,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
