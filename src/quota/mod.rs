//! Daily message quota
//!
//! The proxy owns the authoritative counter ([`SqliteQuotaStore`] behind a
//! [`RateLimiter`]); the client keeps an advisory mirror ([`LocalQuota`]).

pub mod limiter;
pub mod local;
pub mod store;

pub use limiter::{QuotaDecision, RateLimiter};
pub use local::{CountInfo, LocalQuota};
pub use store::{QuotaStore, SqliteQuotaStore};
