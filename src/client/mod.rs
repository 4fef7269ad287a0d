//! Client side of the pipeline
//!
//! - [`stream_client::StreamClient`] -- sends a turn and drives the reply
//!   into a [`stream_client::StreamHandler`].
//! - [`sse`] -- incremental event-stream decoding.
//! - [`reveal`] -- simulated progressive reveal for the fallback path.
//! - [`transport`] -- the proxy connection seam.

pub mod reveal;
pub mod sse;
pub mod stream_client;
pub mod transport;

pub use stream_client::{Capability, StreamClient, StreamHandler};
