//! reqwest implementation of the chat-completion port.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use xtl_core::ports::{ChatCompletion, ChatCompletionPort, CompletionError, CompletionRequest};

use crate::models::{ChatCompletionRequest, ChatCompletionResponse};

/// Timeout applied to every outbound call.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest error body excerpt kept in a transport error.
const ERROR_EXCERPT_CHARS: usize = 200;

/// Client for OpenAI-compatible chat-completions endpoints.
#[derive(Debug, Clone)]
pub struct OpenAiChatClient {
    client: Client,
}

impl OpenAiChatClient {
    /// Client with the default 30 second timeout.
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_timeout(REQUEST_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(10)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ChatCompletionPort for OpenAiChatClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<ChatCompletion, CompletionError> {
        debug!(url = %request.url, model = %request.model, messages = request.messages.len(), "Sending chat completion");

        let body = ChatCompletionRequest {
            model: &request.model,
            messages: &request.messages,
            temperature: request.temperature,
        };
        let response = self
            .client
            .post(&request.url)
            .bearer_auth(&request.credential)
            .json(&body)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        let text = response.text().await.map_err(map_reqwest_error)?;
        if !status.is_success() {
            return Err(CompletionError::Transport {
                status: Some(status.as_u16()),
                message: excerpt(&text),
            });
        }
        parse_completion(&text)
    }
}

/// Extract `choices[0].message.content` and `usage` from a response body.
pub fn parse_completion(body: &str) -> Result<ChatCompletion, CompletionError> {
    let response: ChatCompletionResponse = serde_json::from_str(body)
        .map_err(|e| CompletionError::MalformedResponse(e.to_string()))?;
    let usage = response.usage.map(Into::into);
    let content = response
        .into_content()
        .ok_or(CompletionError::MissingCompletion)?;
    Ok(ChatCompletion { content, usage })
}

fn map_reqwest_error(err: reqwest::Error) -> CompletionError {
    if err.is_timeout() {
        return CompletionError::Timeout;
    }
    CompletionError::Transport {
        status: err.status().map(|s| s.as_u16()),
        message: err.to_string(),
    }
}

fn excerpt(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(ERROR_EXCERPT_CHARS) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
