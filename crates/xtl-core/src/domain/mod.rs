//! Domain types shared across the relay.

mod chat;
mod usage;

pub use chat::{ChatMessage, MessageRole, Turn};
pub use usage::TokenUsage;
