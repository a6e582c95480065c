//! Chat-completion port.
//!
//! Abstracts the remote "OpenAI-compatible" chat-completions call so the
//! relay engine can be driven by the reqwest adapter in production and by
//! canned fakes in tests.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{ChatMessage, TokenUsage};

/// Everything needed to issue one chat-completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Full URL of the chat-completions route.
    pub url: String,
    /// Bearer credential for this call.
    pub credential: String,
    /// Model identifier.
    pub model: String,
    /// Ordered conversation, system message first.
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature.
    pub temperature: f64,
}

impl CompletionRequest {
    /// The leading system message content, if any.
    pub fn system_message(&self) -> Option<&str> {
        self.messages
            .first()
            .filter(|m| m.role == crate::domain::MessageRole::System)
            .map(|m| m.content.as_str())
    }
}

/// The assistant reply of one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatCompletion {
    /// Raw assistant content.
    pub content: String,
    /// Token counts, when the remote reports them.
    pub usage: Option<TokenUsage>,
}

impl ChatCompletion {
    /// A reply without usage information.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            usage: None,
        }
    }
}

/// Errors from a single chat-completion call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CompletionError {
    /// Network, DNS or connection failure, or a non-success HTTP status.
    #[error("Transport error{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Transport {
        /// Remote HTTP status, when a response was received.
        status: Option<u16>,
        message: String,
    },

    /// The call did not complete within the request timeout.
    #[error("Request timed out")]
    Timeout,

    /// The body was not the expected JSON.
    #[error("Malformed completion response: {0}")]
    MalformedResponse(String),

    /// The JSON lacked `choices[0].message.content`.
    #[error("Completion response has no choices[0].message.content")]
    MissingCompletion,
}

/// Port for issuing chat-completion calls.
#[async_trait]
pub trait ChatCompletionPort: Send + Sync {
    /// Send the conversation and return the raw assistant reply.
    async fn complete(&self, request: &CompletionRequest) -> Result<ChatCompletion, CompletionError>;
}
