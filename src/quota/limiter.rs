//! Daily quota gate used by the proxy
//!
//! The limiter increments first and decides afterwards, so the counter
//! itself is the source of truth even under concurrent requests from one
//! device. When the counter storage fails, the request is allowed through.

use crate::quota::QuotaStore;
use chrono::NaiveDate;
use metrics::increment_counter;
use std::sync::Arc;

/// Outcome of a quota check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaDecision {
    /// The request is within today's quota; `count` includes it
    Allowed {
        /// Post-increment count for the device today
        count: u32,
    },
    /// The request would exceed today's quota and must be rejected
    Exceeded {
        /// Post-increment count for the device today
        count: u32,
    },
    /// The counter could not be consulted; the request is allowed
    DegradedOpen,
}

impl QuotaDecision {
    /// Whether the request may proceed upstream
    pub fn is_allowed(&self) -> bool {
        !matches!(self, QuotaDecision::Exceeded { .. })
    }
}

/// Fixed daily quota enforced per device
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn QuotaStore>,
    daily_limit: u32,
}

impl RateLimiter {
    /// Creates a limiter over `store` allowing `daily_limit` requests per day
    pub fn new(store: Arc<dyn QuotaStore>, daily_limit: u32) -> Self {
        Self { store, daily_limit }
    }

    /// The configured per-day limit
    pub fn daily_limit(&self) -> u32 {
        self.daily_limit
    }

    /// Counts this request against `(device_id, date)` and decides on it
    ///
    /// The blocking SQLite work runs on the blocking thread pool. Storage
    /// errors (and a panicked blocking task) degrade open.
    pub async fn check(&self, device_id: &str, date: NaiveDate) -> QuotaDecision {
        let store = Arc::clone(&self.store);
        let device = device_id.to_string();

        let outcome =
            tokio::task::spawn_blocking(move || store.increment(&device, date)).await;

        match outcome {
            Ok(Ok(count)) => self.decide(count),
            Ok(Err(e)) => {
                increment_counter!("proxy_quota_store_errors_total");
                tracing::warn!(
                    device_id = %device_id,
                    error = %e,
                    "Quota store failed; allowing request"
                );
                QuotaDecision::DegradedOpen
            }
            Err(e) => {
                increment_counter!("proxy_quota_store_errors_total");
                tracing::warn!(
                    device_id = %device_id,
                    error = %e,
                    "Quota task failed; allowing request"
                );
                QuotaDecision::DegradedOpen
            }
        }
    }

    fn decide(&self, count: u32) -> QuotaDecision {
        if count > self.daily_limit {
            QuotaDecision::Exceeded { count }
        } else {
            QuotaDecision::Allowed { count }
        }
    }
}
