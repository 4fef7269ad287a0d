//! Conversation orchestration on top of the stream client

pub mod controller;

pub use controller::{ChatController, ChatEvent, ChatSnapshot, ChatState};
