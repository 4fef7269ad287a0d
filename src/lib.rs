//! Noor - streaming assistant proxy and client library
//!
//! This library provides a real-time AI-response delivery pipeline: a
//! client sends a conversation to a proxy, which forwards it to the
//! upstream language-model provider and streams the reply back while
//! enforcing a per-device daily quota.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `proxy`: Axum edge service (validation, quota gate, upstream relay)
//! - `quota`: Server-side SQLite counter, rate limiter and local mirror
//! - `client`: Event-stream decoding, transport and the stream client
//! - `chat`: Conversation controller with exactly-once commit
//! - `identity`: Persistent per-device identifier
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use noor::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config/config.yaml", &Default::default())?;
//!     config.validate()?;
//!
//!     noor::proxy::serve(&config).await
//! }
//! ```

pub mod chat;
pub mod cli;
pub mod client;
pub mod commands;
pub mod config;
pub mod error;
pub mod identity;
pub mod logging;
pub mod message;
pub mod proxy;
pub mod quota;

// Re-export commonly used types
pub use chat::{ChatController, ChatEvent, ChatSnapshot, ChatState};
pub use client::{StreamClient, StreamHandler};
pub use config::Config;
pub use error::{ChatError, NoorError, Result};
pub use message::{Message, Role};
