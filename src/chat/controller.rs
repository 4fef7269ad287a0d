//! Per-conversation orchestration
//!
//! The controller owns the message history and at most one in-flight turn
//! (a session). Each session has an id, an abort handle and a commit guard.
//! Callbacks from the stream client carry their session id, so output from
//! a superseded or already-committed session can never land in history.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::client::{Capability, StreamClient, StreamHandler};
use crate::error::{ChatError, Result};
use crate::message::Message;
use crate::quota::CountInfo;

/// Lifecycle state of the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatState {
    /// No turn in flight
    Idle,
    /// A turn was submitted and no reply text has arrived yet
    Sending,
    /// Reply text is arriving
    Streaming,
    /// The reply is being appended to history
    Committing,
    /// The turn failed; transient before returning to idle
    Error,
}

/// Notifications for renderers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// A fragment of reply text for the live bubble
    Delta {
        /// Session the fragment belongs to
        session: u64,
        /// The fragment
        text: String,
    },
    /// An assistant message was appended to history
    Committed {
        /// Session that produced it
        session: u64,
        /// The committed message
        message: Message,
    },
    /// The turn ended with no usable text; nothing was appended
    Discarded {
        /// Session that ended
        session: u64,
    },
    /// The turn failed; nothing was appended
    Failed {
        /// Session that failed
        session: u64,
        /// Reason to show the user
        error: ChatError,
    },
}

/// Point-in-time view of the conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSnapshot {
    /// Committed messages in turn order
    pub history: Vec<Message>,
    /// Uncommitted reply text of the current turn
    pub live: String,
    /// Current state
    pub state: ChatState,
    /// Error of the most recent failed turn, cleared by the next submit
    pub last_error: Option<ChatError>,
}

struct Session {
    id: u64,
    abort: CancellationToken,
    committed: bool,
}

struct Inner {
    history: Vec<Message>,
    live: String,
    state: ChatState,
    last_error: Option<ChatError>,
    session: Option<Session>,
    next_session: u64,
}

impl Inner {
    fn is_active(&self, session: u64) -> bool {
        matches!(&self.session, Some(s) if s.id == session && !s.committed)
    }
}

struct Shared {
    inner: Mutex<Inner>,
    events: mpsc::UnboundedSender<ChatEvent>,
    state_tx: watch::Sender<ChatState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: ChatEvent) {
        // A dropped receiver only means nobody is rendering
        let _ = self.events.send(event);
    }

    /// Sets the state and publishes it; callers hold the lock so
    /// observers see transitions in mutex order
    fn set_state(&self, inner: &mut Inner, state: ChatState) {
        inner.state = state;
        self.state_tx.send_replace(state);
    }

    /// Commits `text` for `session` once; later calls for it are no-ops
    fn commit(&self, inner: &mut Inner, session: u64, text: String) {
        if !inner.is_active(session) {
            tracing::debug!(session, "Ignoring commit for inactive session");
            return;
        }
        if let Some(s) = inner.session.as_mut() {
            s.committed = true;
        }
        self.set_state(inner, ChatState::Committing);

        if text.trim().is_empty() {
            tracing::debug!(session, "Discarding empty reply");
            self.emit(ChatEvent::Discarded { session });
        } else {
            let message = Message::assistant(text);
            inner.history.push(message.clone());
            tracing::debug!(session, chars = message.content.len(), "Committed reply");
            self.emit(ChatEvent::Committed { session, message });
        }

        inner.live.clear();
        inner.session = None;
        self.set_state(inner, ChatState::Idle);
    }
}

/// Routes one session's callbacks into the controller
struct SessionHandler {
    shared: Arc<Shared>,
    session: u64,
}

impl StreamHandler for SessionHandler {
    fn on_delta(&self, text: &str) {
        let mut inner = self.shared.lock();
        if !inner.is_active(self.session) {
            return;
        }
        inner.live.push_str(text);
        if inner.state != ChatState::Streaming {
            self.shared.set_state(&mut inner, ChatState::Streaming);
        }
        self.shared.emit(ChatEvent::Delta {
            session: self.session,
            text: text.to_string(),
        });
    }

    fn on_complete(&self, text: String) {
        let mut inner = self.shared.lock();
        self.shared.commit(&mut inner, self.session, text);
    }

    fn on_error(&self, error: ChatError) {
        let mut inner = self.shared.lock();
        if !inner.is_active(self.session) {
            return;
        }
        tracing::warn!(session = self.session, "Turn failed: {}", error);
        inner.session = None;
        inner.live.clear();
        inner.last_error = Some(error.clone());
        self.shared.set_state(&mut inner, ChatState::Error);
        self.shared.emit(ChatEvent::Failed {
            session: self.session,
            error,
        });
        self.shared.set_state(&mut inner, ChatState::Idle);
    }
}

/// Conversation controller
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use noor::chat::ChatController;
/// use noor::client::StreamClient;
/// use noor::config::Config;
///
/// # async fn example() -> noor::error::Result<()> {
/// let client = StreamClient::from_config(&Config::default())?;
/// let (controller, _events) = ChatController::new(Arc::new(client));
/// controller.submit("Assalamu alaikum");
/// controller.wait_idle().await;
/// # Ok(())
/// # }
/// ```
pub struct ChatController {
    shared: Arc<Shared>,
    client: Arc<StreamClient>,
}

impl ChatController {
    /// Creates a controller and the receiver for its events
    pub fn new(client: Arc<StreamClient>) -> (Self, mpsc::UnboundedReceiver<ChatEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(ChatState::Idle);
        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner {
                history: Vec::new(),
                live: String::new(),
                state: ChatState::Idle,
                last_error: None,
                session: None,
                next_session: 1,
            }),
            events,
            state_tx,
        });
        (Self { shared, client }, rx)
    }

    /// Starts a new turn with the user's `text`
    ///
    /// A turn still in flight is superseded first: its visible partial reply
    /// is committed (or discarded when empty) and its request is cancelled
    /// without waiting for it. Blank input starts nothing and returns `None`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn submit(&self, text: impl Into<String>) -> Option<u64> {
        let text = text.into();
        if text.trim().is_empty() {
            return None;
        }

        let (session, abort, messages) = {
            let mut inner = self.shared.lock();

            if let Some((previous_id, previous_abort)) =
                inner.session.as_ref().map(|s| (s.id, s.abort.clone()))
            {
                tracing::debug!(session = previous_id, "Superseding in-flight turn");
                let partial = inner.live.clone();
                self.shared.commit(&mut inner, previous_id, partial);
                previous_abort.cancel();
            }

            inner.history.push(Message::user(text));
            let session = inner.next_session;
            inner.next_session += 1;
            let abort = CancellationToken::new();
            inner.session = Some(Session {
                id: session,
                abort: abort.clone(),
                committed: false,
            });
            inner.live.clear();
            inner.last_error = None;
            self.shared.set_state(&mut inner, ChatState::Sending);

            (session, abort, inner.history.clone())
        };

        let handler = SessionHandler {
            shared: Arc::clone(&self.shared),
            session,
        };
        let client = Arc::clone(&self.client);
        tokio::spawn(async move {
            client.send(messages, &handler, &abort).await;
        });

        Some(session)
    }

    /// Stops the current turn
    ///
    /// During a simulated reveal the text revealed so far is committed
    /// immediately. On a real stream the request is aborted and the client's
    /// completion commits what arrived.
    pub fn stop(&self) {
        let mut inner = self.shared.lock();
        let Some((session, abort)) = inner
            .session
            .as_ref()
            .filter(|s| !s.committed)
            .map(|s| (s.id, s.abort.clone()))
        else {
            return;
        };

        if self.client.capability() == Capability::Unsupported {
            let partial = inner.live.clone();
            self.shared.commit(&mut inner, session, partial);
        }
        tracing::debug!(session, "Stopping turn");
        abort.cancel();
    }

    /// Current history, live buffer, state and last error
    pub fn snapshot(&self) -> ChatSnapshot {
        let inner = self.shared.lock();
        ChatSnapshot {
            history: inner.history.clone(),
            live: inner.live.clone(),
            state: inner.state,
            last_error: inner.last_error.clone(),
        }
    }

    /// Committed messages in turn order
    pub fn history(&self) -> Vec<Message> {
        self.shared.lock().history.clone()
    }

    /// Resolves once no turn is in flight
    pub async fn wait_idle(&self) {
        let mut rx = self.shared.state_tx.subscribe();
        // The sender lives in `self`, so the channel cannot close here
        let _ = rx.wait_for(|state| *state == ChatState::Idle).await;
    }

    /// Local quota hint for the UI
    ///
    /// # Errors
    ///
    /// Returns an error if the local quota store cannot be read.
    pub fn count_info(&self) -> Result<CountInfo> {
        self.client.count_info()
    }
}
