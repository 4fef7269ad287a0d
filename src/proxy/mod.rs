//! Streaming proxy
//!
//! A stateless HTTP edge in front of the language-model provider. Each
//! `POST /v1/chat` is validated, counted against the device's daily quota,
//! forwarded upstream with the fixed system directive and piped back. The
//! only shared state is the quota store.

pub mod error;
pub mod handlers;
pub mod metrics;
pub mod prompt;
pub mod upstream;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::error::{NoorError, Result};
use crate::quota::{RateLimiter, SqliteQuotaStore};

pub use error::ProxyError;
pub use upstream::UpstreamClient;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    /// Daily quota gate
    pub limiter: RateLimiter,
    /// Upstream provider client
    pub upstream: Arc<UpstreamClient>,
}

impl AppState {
    /// Creates handler state from its parts
    pub fn new(limiter: RateLimiter, upstream: UpstreamClient) -> Self {
        Self {
            limiter,
            upstream: Arc::new(upstream),
        }
    }

    /// Builds the production state: SQLite quota store and configured upstream
    ///
    /// # Errors
    ///
    /// Returns an error if the quota database cannot be opened or the HTTP
    /// client cannot be built.
    pub fn from_config(config: &Config) -> Result<Self> {
        let db_path = config.quota_db_path()?;
        tracing::info!("Using quota database at {}", db_path.display());
        let store = SqliteQuotaStore::new_with_path(db_path)?;
        let limiter = RateLimiter::new(Arc::new(store), config.proxy.daily_limit);
        let upstream = UpstreamClient::new(config.proxy.upstream.clone())?;
        Ok(Self::new(limiter, upstream))
    }
}

/// Builds the proxy router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/chat", post(handlers::chat))
        .route("/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Runs the proxy until Ctrl-C
///
/// # Errors
///
/// Returns an error if state construction fails or the listener cannot bind.
pub async fn serve(config: &Config) -> Result<()> {
    let state = AppState::from_config(config)?;
    metrics::init_metrics_exporter();

    let listener = tokio::net::TcpListener::bind(&config.proxy.bind_address)
        .await
        .map_err(|e| {
            NoorError::Config(format!(
                "Failed to bind {}: {}",
                config.proxy.bind_address, e
            ))
        })?;

    tracing::info!(
        "Proxy listening on {} (daily limit {})",
        config.proxy.bind_address,
        state.limiter.daily_limit()
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Proxy stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
