//! Stream client
//!
//! Sends one conversation turn to the proxy and reports the reply through a
//! [`StreamHandler`]. Incremental delivery is used when the transport can
//! read the body progressively; otherwise the client requests the whole
//! reply and replays it with a simulated reveal. Which of the two applies is
//! discovered on the first send and remembered for the client's lifetime.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::client::reveal::reveal;
use crate::client::sse::SseDecoder;
use crate::client::transport::{
    ByteStream, ChatTransport, HttpTransport, ProxyRequest, StreamOpen,
};
use crate::config::Config;
use crate::error::{ChatError, Result};
use crate::identity::DeviceIdentity;
use crate::message::Message;
use crate::quota::{CountInfo, LocalQuota};

/// Receiver of one turn's output
///
/// `on_delta` may be called any number of times, in arrival order. Exactly
/// one of `on_complete` or `on_error` is called last.
pub trait StreamHandler: Send + Sync {
    /// A new fragment of reply text
    fn on_delta(&self, text: &str);

    /// The turn finished; `text` is everything delivered (possibly partial
    /// after a cancellation, possibly empty)
    fn on_complete(&self, text: String);

    /// The turn failed; nothing should be committed
    fn on_error(&self, error: ChatError);
}

/// Whether incremental body reads work for this client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Not yet determined
    Unknown,
    /// Bodies can be read incrementally
    Supported,
    /// Bodies arrive whole; use the fallback
    Unsupported,
}

/// Sends turns to the proxy and drives the reply into a [`StreamHandler`]
pub struct StreamClient {
    transport: Arc<dyn ChatTransport>,
    identity: Arc<DeviceIdentity>,
    quota: LocalQuota,
    capability: Mutex<Capability>,
    reveal_interval: Duration,
    ephemeral_device_id: String,
}

impl StreamClient {
    /// Creates a client from its collaborators
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        identity: Arc<DeviceIdentity>,
        quota: LocalQuota,
        reveal_interval: Duration,
    ) -> Self {
        Self {
            transport,
            identity,
            quota,
            capability: Mutex::new(Capability::Unknown),
            reveal_interval,
            ephemeral_device_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Creates the production client: HTTP transport, keyring identity and
    /// the sled-backed local quota mirror
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or the local
    /// state directory cannot be opened.
    pub fn from_config(config: &Config) -> Result<Self> {
        let transport = HttpTransport::new(&config.client)?;
        let state_dir = config.client_state_dir()?;
        let quota = LocalQuota::open(
            state_dir,
            config.client.daily_limit,
            config.client.warn_threshold,
        )?;

        Ok(Self::new(
            Arc::new(transport),
            Arc::new(DeviceIdentity::keyring()),
            quota,
            Duration::from_millis(config.client.reveal_interval_ms),
        ))
    }

    /// Current delivery capability
    pub fn capability(&self) -> Capability {
        self.capability
            .lock()
            .map(|c| *c)
            .unwrap_or(Capability::Unknown)
    }

    fn set_capability(&self, capability: Capability) {
        if let Ok(mut current) = self.capability.lock() {
            if *current != capability {
                tracing::debug!("Stream capability: {:?} -> {:?}", *current, capability);
                *current = capability;
            }
        }
    }

    /// Local quota hint for today
    ///
    /// # Errors
    ///
    /// Returns an error if the local store cannot be read.
    pub fn count_info(&self) -> Result<CountInfo> {
        self.quota.count_info()
    }

    /// Sends `messages` and reports the reply to `handler`
    ///
    /// Cancelling `abort` ends the turn with `on_complete` carrying whatever
    /// text was delivered up to that point.
    pub async fn send<H>(&self, messages: Vec<Message>, handler: &H, abort: &CancellationToken)
    where
        H: StreamHandler + ?Sized,
    {
        match self.run(messages, handler, abort).await {
            Ok(text) => handler.on_complete(text),
            Err(error) => {
                tracing::debug!("Turn failed: {}", error);
                handler.on_error(error)
            }
        }
    }

    async fn run<H>(
        &self,
        messages: Vec<Message>,
        handler: &H,
        abort: &CancellationToken,
    ) -> std::result::Result<String, ChatError>
    where
        H: StreamHandler + ?Sized,
    {
        match self.quota.count_info() {
            Ok(info) if info.is_limit_reached => {
                tracing::info!(count = info.count, "Local daily limit reached; not sending");
                return Err(ChatError::QuotaExceeded);
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("Local quota unavailable: {}", e),
        }

        let device_id = self.device_id();
        self.bump_local_count();

        if self.capability() != Capability::Unsupported {
            let request = ProxyRequest {
                messages: messages.clone(),
                device_id: device_id.clone(),
                stream: true,
            };

            let opened = tokio::select! {
                biased;
                _ = abort.cancelled() => return Ok(String::new()),
                opened = self.transport.open_stream(&request) => opened,
            };

            match opened.map_err(ChatError::from)? {
                StreamOpen::Streaming(stream) => {
                    self.set_capability(Capability::Supported);
                    return self.read_stream(stream, handler, abort).await;
                }
                StreamOpen::Unsupported => {
                    tracing::info!("Incremental reads unavailable; using simulated reveal");
                    self.set_capability(Capability::Unsupported);
                }
            }
        }

        self.fallback(messages, device_id, handler, abort).await
    }

    fn device_id(&self) -> String {
        match self.identity.device_id() {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!("Device identity unavailable, using ephemeral id: {}", e);
                self.ephemeral_device_id.clone()
            }
        }
    }

    fn bump_local_count(&self) {
        let quota = self.quota.clone();
        tokio::task::spawn_blocking(move || {
            if let Err(e) = quota.increment() {
                tracing::warn!("Failed to update local quota: {}", e);
            }
        });
    }

    async fn read_stream<H>(
        &self,
        mut stream: ByteStream,
        handler: &H,
        abort: &CancellationToken,
    ) -> std::result::Result<String, ChatError>
    where
        H: StreamHandler + ?Sized,
    {
        let mut decoder = SseDecoder::new();
        let mut accumulated = String::new();

        loop {
            let next = tokio::select! {
                biased;
                _ = abort.cancelled() => {
                    tracing::debug!(chars = accumulated.len(), "Stream cancelled");
                    return Ok(accumulated);
                }
                next = stream.next() => next,
            };

            match next {
                Some(Ok(chunk)) => {
                    for fragment in decoder.push(&chunk) {
                        accumulated.push_str(&fragment);
                        handler.on_delta(&fragment);
                    }
                }
                Some(Err(e)) => {
                    if abort.is_cancelled() {
                        return Ok(accumulated);
                    }
                    tracing::warn!("Stream interrupted: {}", e);
                    return Err(ChatError::StreamInterrupted);
                }
                None => break,
            }
        }

        for fragment in decoder.finish() {
            accumulated.push_str(&fragment);
            handler.on_delta(&fragment);
        }
        Ok(accumulated)
    }

    async fn fallback<H>(
        &self,
        messages: Vec<Message>,
        device_id: String,
        handler: &H,
        abort: &CancellationToken,
    ) -> std::result::Result<String, ChatError>
    where
        H: StreamHandler + ?Sized,
    {
        let request = ProxyRequest {
            messages,
            device_id,
            stream: false,
        };

        let completed = tokio::select! {
            biased;
            _ = abort.cancelled() => return Ok(String::new()),
            completed = self.transport.complete(&request) => completed,
        };
        let text = completed.map_err(ChatError::from)?;

        let result = reveal(&text, self.reveal_interval, abort, |token| {
            handler.on_delta(token)
        })
        .await;

        if result.cancelled {
            Ok(result.revealed)
        } else {
            Ok(text)
        }
    }
}
