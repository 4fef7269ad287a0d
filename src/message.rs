//! Conversation message types shared by the proxy, client and controller

use serde::{Deserialize, Serialize};

/// Author of a conversation message
///
/// Only the two conversational roles exist on the wire between client and
/// proxy. The proxy's fixed directive travels in the upstream `system` field
/// and never appears as a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person using the app
    User,
    /// The language model
    Assistant,
}

impl Role {
    /// Wire name of the role
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single committed conversation message
///
/// # Examples
///
/// ```
/// use noor::message::{Message, Role};
///
/// let msg = Message::user("Assalamu alaikum");
/// assert_eq!(msg.role, Role::User);
/// assert_eq!(msg.content, "Assalamu alaikum");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Who wrote the message
    pub role: Role,
    /// Message text
    pub content: String,
}

impl Message {
    /// Creates a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Creates a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}
