//! Scripted in-process transport for tests
//!
//! Replies are queued up front and consumed in order, one per call. A
//! streaming reply is backed by a channel, so a test can either queue all
//! chunks at once ([`FakeTransport::push_stream`]) or keep the sender and
//! feed chunks while the client is reading ([`FakeTransport::push_stream_channel`]).
//!
//! # Example
//!
//! ```
//! use noor::client::transport::fake::FakeTransport;
//! use noor::client::transport::{ChatTransport, ProxyRequest, StreamOpen};
//! use noor::message::Message;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let transport = FakeTransport::new();
//! transport.push_complete("Peace be upon you");
//!
//! let request = ProxyRequest {
//!     messages: vec![Message::user("Salaam")],
//!     device_id: "dev".into(),
//!     stream: false,
//! };
//! let text = transport.complete(&request).await.unwrap();
//! assert_eq!(text, "Peace be upon you");
//! assert_eq!(transport.requests().len(), 1);
//! # }
//! ```

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use super::{ChatTransport, ProxyRequest, StreamOpen, TransportError};

/// Sender half used to feed a live fake stream
pub type ChunkSender = mpsc::UnboundedSender<Result<Bytes, TransportError>>;

enum StreamReply {
    Chunks(mpsc::UnboundedReceiver<Result<Bytes, TransportError>>),
    Unsupported,
    Fail(TransportError),
}

enum CompleteReply {
    Text(String),
    Fail(TransportError),
    Pending,
}

/// Transport returning queued replies
#[derive(Default)]
pub struct FakeTransport {
    stream_replies: Mutex<VecDeque<StreamReply>>,
    complete_replies: Mutex<VecDeque<CompleteReply>>,
    requests: Mutex<Vec<ProxyRequest>>,
}

impl FakeTransport {
    /// Creates a transport with no queued replies
    pub fn new() -> Self {
        Self::default()
    }

    fn queue_stream(&self, reply: StreamReply) {
        if let Ok(mut queue) = self.stream_replies.lock() {
            queue.push_back(reply);
        }
    }

    fn queue_complete(&self, reply: CompleteReply) {
        if let Ok(mut queue) = self.complete_replies.lock() {
            queue.push_back(reply);
        }
    }

    /// Queue a stream whose chunks are all available immediately
    pub fn push_stream<I, C>(&self, chunks: I)
    where
        I: IntoIterator<Item = C>,
        C: Into<Bytes>,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        for chunk in chunks {
            let _ = tx.send(Ok(chunk.into()));
        }
        self.queue_stream(StreamReply::Chunks(rx));
    }

    /// Queue a stream fed through the returned sender; dropping it ends the stream
    pub fn push_stream_channel(&self) -> ChunkSender {
        let (tx, rx) = mpsc::unbounded_channel();
        self.queue_stream(StreamReply::Chunks(rx));
        tx
    }

    /// Queue a response whose body cannot be read incrementally
    pub fn push_unsupported(&self) {
        self.queue_stream(StreamReply::Unsupported);
    }

    /// Queue a failure for the next streaming request
    pub fn push_stream_error(&self, error: TransportError) {
        self.queue_stream(StreamReply::Fail(error));
    }

    /// Queue a non-streaming reply
    pub fn push_complete(&self, text: impl Into<String>) {
        self.queue_complete(CompleteReply::Text(text.into()));
    }

    /// Queue a failure for the next non-streaming request
    pub fn push_complete_error(&self, error: TransportError) {
        self.queue_complete(CompleteReply::Fail(error));
    }

    /// Queue a non-streaming request that never answers
    pub fn push_complete_pending(&self) {
        self.queue_complete(CompleteReply::Pending);
    }

    /// Requests received so far, in order
    pub fn requests(&self) -> Vec<ProxyRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    fn record(&self, request: &ProxyRequest) {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
    }
}

#[async_trait]
impl ChatTransport for FakeTransport {
    async fn open_stream(&self, request: &ProxyRequest) -> Result<StreamOpen, TransportError> {
        self.record(request);
        let reply = self
            .stream_replies
            .lock()
            .ok()
            .and_then(|mut q| q.pop_front());

        match reply {
            Some(StreamReply::Chunks(rx)) => {
                let stream = futures::stream::unfold(rx, |mut rx| async move {
                    rx.recv().await.map(|item| (item, rx))
                });
                Ok(StreamOpen::Streaming(Box::pin(stream)))
            }
            Some(StreamReply::Unsupported) => Ok(StreamOpen::Unsupported),
            Some(StreamReply::Fail(error)) => Err(error),
            None => Err(TransportError::Network("no scripted stream reply".into())),
        }
    }

    async fn complete(&self, request: &ProxyRequest) -> Result<String, TransportError> {
        self.record(request);
        let reply = self
            .complete_replies
            .lock()
            .ok()
            .and_then(|mut q| q.pop_front());

        match reply {
            Some(CompleteReply::Text(text)) => Ok(text),
            Some(CompleteReply::Fail(error)) => Err(error),
            Some(CompleteReply::Pending) => std::future::pending().await,
            None => Err(TransportError::Network("no scripted completion reply".into())),
        }
    }
}
