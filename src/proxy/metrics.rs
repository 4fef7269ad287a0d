//! Proxy metrics
//!
//! # Metrics
//!
//! - `proxy_requests_total`: Counter of chat requests that passed validation
//! - `proxy_quota_rejections_total`: Counter of requests rejected for quota
//! - `proxy_quota_store_errors_total`: Counter of quota store failures (degraded open)
//! - `proxy_upstream_errors_total`: Counter of upstream failures by `kind`
//! - `proxy_upstream_latency_seconds`: Histogram of time to upstream response headers

use metrics::{histogram, increment_counter};
use std::time::Duration;

/// Record a validated chat request
pub fn record_request(stream: bool) {
    increment_counter!("proxy_requests_total", "stream" => if stream { "true" } else { "false" });
}

/// Record a quota rejection
pub fn record_quota_rejection() {
    increment_counter!("proxy_quota_rejections_total");
}

/// Record an upstream failure of the given kind
pub fn record_upstream_error(kind: &'static str) {
    increment_counter!("proxy_upstream_errors_total", "kind" => kind);
}

/// Record how long the upstream took to answer with headers
pub fn record_upstream_latency(elapsed: Duration) {
    histogram!("proxy_upstream_latency_seconds", elapsed.as_secs_f64());
}

/// Install the Prometheus exporter when the `prometheus` feature is enabled
///
/// Without the feature this is a no-op and the metric macros record into
/// the default no-op recorder.
pub fn init_metrics_exporter() {
    #[cfg(feature = "prometheus")]
    {
        use metrics_exporter_prometheus::PrometheusBuilder;
        let builder = PrometheusBuilder::new();
        let _ = builder.install().map_err(|e| {
            tracing::warn!("Failed to install Prometheus exporter: {}", e);
        });
    }
}
