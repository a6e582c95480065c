//! Wire types for the inbound relay API and the outbound chat-completions API.
//!
//! Domain types live in `xtl-core`; this module only handles the JSON shape.

use serde::{Deserialize, Serialize};
use xtl_core::{ChatMessage, TokenUsage};

// =============================================================================
// Inbound
// =============================================================================

/// Query string of `GET /?text=...`.
///
/// Built from the raw key/value pairs so a repeated `text` parameter takes the
/// first value instead of failing the request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranslateQuery {
    pub text: Option<String>,
}

impl TranslateQuery {
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        Self {
            text: pairs
                .into_iter()
                .find(|(key, _)| key == "text")
                .map(|(_, value)| value),
        }
    }
}

// =============================================================================
// Outbound
// =============================================================================

/// Body of `POST {endpoint}/chat/completions`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [ChatMessage],
    pub temperature: f64,
}

/// The subset of a chat-completions response the relay reads.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

/// The `usage` object. Some servers omit individual counts.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

impl From<Usage> for TokenUsage {
    fn from(usage: Usage) -> Self {
        Self {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub message: Option<ResponseMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatCompletionResponse {
    /// `choices[0].message.content`, if present.
    pub fn into_content(self) -> Option<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
    }
}
