//! Test doubles for the core ports.
//!
//! Shared by the unit tests here and by the tests of the adapter crates,
//! which enable the `test-utils` feature.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{
    ChatCompletion, ChatCompletionPort, CompletionError, CompletionRequest, RelayEventEmitter,
};
use crate::domain::TokenUsage;
use crate::events::RelayEvent;

/// One scripted reply of the fake completion port.
#[derive(Debug, Clone)]
pub enum Scripted {
    /// Return this content.
    Reply(String),
    /// Fail with this error.
    Fail(CompletionError),
    /// Sleep this long before answering with an empty reply.
    Stall(Duration),
    /// Sleep this long, then return this content.
    Slow(Duration, String),
}

impl Scripted {
    pub fn reply(content: impl Into<String>) -> Self {
        Self::Reply(content.into())
    }
}

/// A fake chat-completion port that plays back scripted replies in order.
///
/// Once the script is exhausted the fallback is repeated. Every request is
/// recorded for later inspection.
#[derive(Debug, Clone)]
pub struct ScriptedCompletions {
    script: Arc<Mutex<VecDeque<Scripted>>>,
    fallback: Scripted,
    usage: Option<TokenUsage>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl ScriptedCompletions {
    /// Replies `fallback` to every call.
    pub fn always(fallback: Scripted) -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::new())),
            fallback,
            usage: None,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Report `usage` with every successful reply.
    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Plays `script` first, then repeats `fallback`.
    pub fn new(script: impl IntoIterator<Item = Scripted>, fallback: Scripted) -> Self {
        let fake = Self::always(fallback);
        fake.script.lock().extend(script);
        fake
    }

    /// Number of calls so far.
    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    /// Copies of all recorded requests.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().clone()
    }

    /// The most recent request, if any.
    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.requests.lock().last().cloned()
    }
}

#[async_trait]
impl ChatCompletionPort for ScriptedCompletions {
    async fn complete(&self, request: &CompletionRequest) -> Result<ChatCompletion, CompletionError> {
        self.requests.lock().push(request.clone());
        let next = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        let content = match next {
            Scripted::Reply(content) => content,
            Scripted::Fail(err) => return Err(err),
            Scripted::Stall(duration) => {
                tokio::time::sleep(duration).await;
                String::new()
            }
            Scripted::Slow(duration, content) => {
                tokio::time::sleep(duration).await;
                content
            }
        };
        Ok(ChatCompletion {
            content,
            usage: self.usage,
        })
    }
}

/// An emitter that keeps every event it receives.
#[derive(Debug, Clone, Default)]
pub struct RecordingEmitter {
    events: Arc<Mutex<Vec<RelayEvent>>>,
}

impl RecordingEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RelayEvent> {
        self.events.lock().clone()
    }

    /// Names of the recorded events, in order.
    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(RelayEvent::name).collect()
    }
}

impl RelayEventEmitter for RecordingEmitter {
    fn emit(&self, event: RelayEvent) {
        self.events.lock().push(event);
    }
}
