//! Proxy integration tests
//!
//! Drives the axum router with `tower::ServiceExt::oneshot` while a
//! `wiremock` server stands in for the upstream provider.

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::Value;
use tower::util::ServiceExt;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{
    chat_body, proxy_router, upstream_message_body, upstream_stream_body, TEST_API_KEY,
};

fn chat_request(body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/v1/chat")
        .header("Content-Type", "application/json")
        .body(body.into())
        .unwrap()
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn body_json(response: axum::response::Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

async fn mount_stream(server: &MockServer, texts: &[&str]) {
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            upstream_stream_body(texts).into_bytes(),
            "text/event-stream",
        ))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _tmp) = proxy_router("http://127.0.0.1:9", Some(TEST_API_KEY), 20);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "noor-proxy");
}

#[tokio::test]
async fn test_streaming_passthrough_forwards_upstream_bytes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", TEST_API_KEY))
        .and(header("anthropic-version", "2023-06-01"))
        .and(body_partial_json(serde_json::json!({
            "stream": true,
            "messages": [{ "role": "user", "content": "Assalamu alaikum" }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            upstream_stream_body(&["Wa alaikum", " salaam"]).into_bytes(),
            "text/event-stream",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let (app, _tmp) = proxy_router(&server.uri(), Some(TEST_API_KEY), 20);
    let response = app
        .oneshot(chat_request(chat_body("device-1", None)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers["content-type"], "text/event-stream");
    assert_eq!(headers["cache-control"], "no-cache, no-transform");
    assert_eq!(headers["x-accel-buffering"], "no");

    let body = String::from_utf8(body_bytes(response).await).unwrap();
    assert_eq!(body, upstream_stream_body(&["Wa alaikum", " salaam"]));
}

#[tokio::test]
async fn test_system_directive_is_injected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(body_partial_json(serde_json::json!({
            "system": noor::proxy::prompt::system_directive()
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(upstream_message_body("ok")))
        .expect(1)
        .mount(&server)
        .await;

    let (app, _tmp) = proxy_router(&server.uri(), Some(TEST_API_KEY), 20);
    let response = app
        .oneshot(chat_request(chat_body("device-1", Some(false))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_non_streaming_returns_text_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(body_partial_json(serde_json::json!({ "stream": false })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(upstream_message_body("Peace be upon you")),
        )
        .mount(&server)
        .await;

    let (app, _tmp) = proxy_router(&server.uri(), Some(TEST_API_KEY), 20);
    let response = app
        .oneshot(chat_request(chat_body("device-1", Some(false))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body, serde_json::json!({ "text": "Peace be upon you" }));
}

#[tokio::test]
async fn test_validation_failures_return_400() {
    let (app, _tmp) = proxy_router("http://127.0.0.1:9", Some(TEST_API_KEY), 20);

    let cases = [
        "not json",
        r#"{"messages":[],"deviceId":"d"}"#,
        r#"{"messages":[{"role":"system","content":"x"}],"deviceId":"d"}"#,
        r#"{"messages":[{"role":"user","content":""}],"deviceId":"d"}"#,
        r#"{"messages":[{"role":"user","content":"hi"}]}"#,
        r#"{"messages":[{"role":"user","content":"hi"}],"deviceId":""}"#,
        r#"{"messages":[{"role":"user","content":"hi"}],"deviceId":"d","stream":"yes"}"#,
    ];

    for case in cases {
        let response = app.clone().oneshot(chat_request(case)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {}", case);
        let body = body_json(response).await;
        assert!(body["error"].as_str().is_some(), "body: {}", case);
    }
}

#[tokio::test]
async fn test_quota_exceeded_never_reaches_upstream() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            upstream_stream_body(&["ok"]).into_bytes(),
            "text/event-stream",
        ))
        // Two accepted sends for device-1 plus one for device-2
        .expect(3)
        .mount(&server)
        .await;

    let (app, _tmp) = proxy_router(&server.uri(), Some(TEST_API_KEY), 2);

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(chat_request(chat_body("device-1", None)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        body_bytes(response).await;
    }

    let response = app
        .clone()
        .oneshot(chat_request(chat_body("device-1", None)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let body = body_json(response).await;
    assert_eq!(body["error"], noor::error::QUOTA_MESSAGE);

    // Another device still has its own allowance
    let response = app
        .oneshot(chat_request(chat_body("device-2", None)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_upstream_auth_failure_is_generic_502() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "type": "error",
            "error": { "type": "authentication_error", "message": "invalid x-api-key sk-test-secret-key" }
        })))
        .mount(&server)
        .await;

    let (app, _tmp) = proxy_router(&server.uri(), Some(TEST_API_KEY), 20);
    let response = app
        .oneshot(chat_request(chat_body("device-1", None)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let raw = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(!raw.contains(TEST_API_KEY));
    assert!(!raw.contains("authentication_error"));
    let body: Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(body["error"], "AI service misconfigured");
}

#[tokio::test]
async fn test_missing_credential_is_502_without_upstream_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (app, _tmp) = proxy_router(&server.uri(), None, 20);
    let response = app
        .oneshot(chat_request(chat_body("device-1", None)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = body_json(response).await;
    assert_eq!(body["error"], "AI service misconfigured");
}

#[tokio::test]
async fn test_upstream_busy_maps_to_503() {
    for status in [429u16, 500, 529] {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(status).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let (app, _tmp) = proxy_router(&server.uri(), Some(TEST_API_KEY), 20);
        let response = app
            .oneshot(chat_request(chat_body("device-1", None)))
            .await
            .unwrap();

        assert_eq!(
            response.status(),
            StatusCode::SERVICE_UNAVAILABLE,
            "upstream status {}",
            status
        );
        let body = body_json(response).await;
        assert_eq!(body["error"], "AI service is busy, please try again");
    }
}

#[tokio::test]
async fn test_other_upstream_status_maps_to_502_with_code() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
        .mount(&server)
        .await;

    let (app, _tmp) = proxy_router(&server.uri(), Some(TEST_API_KEY), 20);
    let response = app
        .oneshot(chat_request(chat_body("device-1", Some(false))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = body_json(response).await;
    assert_eq!(body["error"], "AI service error (status 404)");
}

#[tokio::test]
async fn test_unreachable_upstream_is_502() {
    // Nothing listens on the discard port
    let (app, _tmp) = proxy_router("http://127.0.0.1:9", Some(TEST_API_KEY), 20);
    let response = app
        .oneshot(chat_request(chat_body("device-1", None)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Failed to reach AI service");
}

#[tokio::test]
async fn test_invalid_non_streaming_body_is_502() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let (app, _tmp) = proxy_router(&server.uri(), Some(TEST_API_KEY), 20);
    let response = app
        .oneshot(chat_request(chat_body("device-1", Some(false))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_streaming_body_with_only_control_events_passes_through() {
    let server = MockServer::start().await;
    mount_stream(&server, &[]).await;

    let (app, _tmp) = proxy_router(&server.uri(), Some(TEST_API_KEY), 20);
    let response = app
        .oneshot(chat_request(chat_body("device-1", Some(true))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(!body.contains("text_delta"));
    assert!(body.contains("message_stop"));
}
