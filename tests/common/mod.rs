use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;

use noor::client::transport::{ChatTransport, HttpTransport};
use noor::client::{StreamClient, StreamHandler};
use noor::config::{ClientConfig, UpstreamConfig};
use noor::error::ChatError;
use noor::identity::{DeviceIdentity, MemorySecretStore};
use noor::proxy::{router, AppState, UpstreamClient};
use noor::quota::{LocalQuota, RateLimiter, SqliteQuotaStore};

pub const TEST_API_KEY: &str = "sk-test-secret-key";

#[allow(dead_code)]
pub fn upstream_config(api_base: &str, api_key: Option<&str>) -> UpstreamConfig {
    UpstreamConfig {
        api_base: api_base.to_string(),
        timeout_seconds: 5,
        api_key: api_key.map(str::to_string),
        ..UpstreamConfig::default()
    }
}

/// Proxy router backed by a temporary SQLite quota database
#[allow(dead_code)]
pub fn proxy_router(
    api_base: &str,
    api_key: Option<&str>,
    daily_limit: u32,
) -> (axum::Router, TempDir) {
    let tmp = TempDir::new().expect("failed to create tempdir");
    let store = SqliteQuotaStore::new_with_path(tmp.path().join("quota.db"))
        .expect("failed to create sqlite quota store");
    let limiter = RateLimiter::new(Arc::new(store), daily_limit);
    let upstream = UpstreamClient::new(upstream_config(api_base, api_key))
        .expect("failed to create upstream client");
    (router(AppState::new(limiter, upstream)), tmp)
}

/// Runs the proxy on an ephemeral port and returns its chat endpoint URL
#[allow(dead_code)]
pub async fn spawn_proxy(
    api_base: &str,
    api_key: Option<&str>,
    daily_limit: u32,
) -> (String, TempDir) {
    let (app, tmp) = proxy_router(api_base, api_key, daily_limit);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind test listener");
    let addr = listener.local_addr().expect("listener has no address");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{}/v1/chat", addr), tmp)
}

#[allow(dead_code)]
pub fn client_config(endpoint: &str) -> ClientConfig {
    ClientConfig {
        endpoint: endpoint.to_string(),
        reveal_interval_ms: 1,
        connect_timeout_seconds: 5,
        ..ClientConfig::default()
    }
}

/// Stream client with an in-memory identity and a temporary local quota
#[allow(dead_code)]
pub fn stream_client(transport: Arc<dyn ChatTransport>) -> (StreamClient, LocalQuota, TempDir) {
    let tmp = TempDir::new().expect("failed to create tempdir");
    let quota = LocalQuota::open(tmp.path(), 20, 3).expect("failed to open local quota");
    let client = StreamClient::new(
        transport,
        Arc::new(DeviceIdentity::new(Box::new(MemorySecretStore::new()))),
        quota.clone(),
        Duration::from_millis(1),
    );
    (client, quota, tmp)
}

#[allow(dead_code)]
pub fn http_stream_client(config: &ClientConfig) -> (StreamClient, LocalQuota, TempDir) {
    let transport = HttpTransport::new(config).expect("failed to create http transport");
    stream_client(Arc::new(transport))
}

/// One upstream text delta event, as the provider sends it
#[allow(dead_code)]
pub fn text_delta_event(text: &str) -> String {
    let payload = serde_json::json!({
        "type": "content_block_delta",
        "index": 0,
        "delta": { "type": "text_delta", "text": text }
    });
    format!("event: content_block_delta\ndata: {}\n\n", payload)
}

/// A full upstream event stream carrying `texts` between control events
#[allow(dead_code)]
pub fn upstream_stream_body(texts: &[&str]) -> String {
    let mut body = String::new();
    body.push_str(
        "event: message_start\ndata: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\"}}\n\n",
    );
    body.push_str("event: content_block_start\ndata: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n\n");
    body.push_str("event: ping\ndata: {\"type\":\"ping\"}\n\n");
    for text in texts {
        body.push_str(&text_delta_event(text));
    }
    body.push_str(
        "event: content_block_stop\ndata: {\"type\":\"content_block_stop\",\"index\":0}\n\n",
    );
    body.push_str("event: message_delta\ndata: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\"}}\n\n");
    body.push_str("event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n");
    body
}

/// Upstream non-streaming messages response
#[allow(dead_code)]
pub fn upstream_message_body(text: &str) -> serde_json::Value {
    serde_json::json!({
        "id": "msg_1",
        "type": "message",
        "role": "assistant",
        "content": [{ "type": "text", "text": text }],
        "stop_reason": "end_turn"
    })
}

#[allow(dead_code)]
pub fn chat_body(device_id: &str, stream: Option<bool>) -> String {
    let mut body = serde_json::json!({
        "messages": [{ "role": "user", "content": "Assalamu alaikum" }],
        "deviceId": device_id,
    });
    if let Some(stream) = stream {
        body["stream"] = serde_json::Value::Bool(stream);
    }
    body.to_string()
}

/// Handler that records every callback
#[allow(dead_code)]
#[derive(Default)]
pub struct Recorder {
    pub deltas: Mutex<Vec<String>>,
    pub completed: Mutex<Vec<String>>,
    pub errors: Mutex<Vec<ChatError>>,
}

#[allow(dead_code)]
impl Recorder {
    pub fn deltas(&self) -> Vec<String> {
        self.deltas.lock().unwrap().clone()
    }

    pub fn completed(&self) -> Vec<String> {
        self.completed.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<ChatError> {
        self.errors.lock().unwrap().clone()
    }
}

impl StreamHandler for Recorder {
    fn on_delta(&self, text: &str) {
        self.deltas.lock().unwrap().push(text.to_string());
    }

    fn on_complete(&self, text: String) {
        self.completed.lock().unwrap().push(text);
    }

    fn on_error(&self, error: ChatError) {
        self.errors.lock().unwrap().push(error);
    }
}
