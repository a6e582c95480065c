//! Translation relay engine.
//!
//! Orchestrates one translation request: rule pre-processing, glossary hints,
//! context replay, the remote chat-completion call, reply parsing and
//! validation, all wrapped in a bounded retry loop.
//!
//! Each request holds one worker permit for its whole retry cycle, so the
//! worker count bounds concurrent requests exactly as a fixed thread pool
//! would. A worst-case request (every attempt near the timeout, plus the
//! retry delays) keeps its permit for minutes, so size `workers` to the
//! number of concurrent clients rather than to the request rate.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::context::{client_key, ContextManager};
use super::glossary::{format_hint_block, GlossaryStore};
use super::keys::KeyRotator;
use super::rules::RuleEngine;
use super::usage::UsageMeter;
use crate::domain::{ChatMessage, Turn};
use crate::events::RelayEvent;
use crate::ports::{ChatCompletionPort, CompletionError, CompletionRequest, RelayEventEmitter};
use crate::settings::{RelayConfig, SharedConfig};

/// Plain-text body returned to the client when every attempt failed.
pub const FAILURE_BODY: &str = "翻译失败 / Translation failed";

/// Appended to the system prompt when an attempt runs in extraction mode.
const EXTRACTION_INSTRUCTION: &str = "\n\n【Instruction】:\n\
1. Put translation in <tl>...</tl> tags.\n\
2. If you find NEW proper nouns (names, places) NOT in Known Terms, extract them in <tm>Original=Translated</tm> tags (one per line).\n\
3. Only extract proper nouns, NO verbs/common nouns.";

static TRANSLATION_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<tl>(.*?)</tl>").expect("valid translation tag regex"));
static TERM_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<tm>(.*?)</tm>").expect("valid term tag regex"));
static ANY_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid tag regex"));
static THINK_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<think>.*?</think>").expect("valid think block regex"));

/// Retry behaviour of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per request, including the first.
    pub max_attempts: u32,
    /// Pause before every attempt after the first.
    pub delay: Duration,
    /// Upper bound on a single remote call.
    pub request_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(1),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Failure category of a single attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptErrorKind {
    CredentialUnavailable,
    TransportError,
    Timeout,
    ResponseFormatError,
    ValidationRejected,
}

/// Why a single attempt produced no usable translation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AttemptError {
    #[error("No credential configured")]
    CredentialUnavailable,

    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error("Reply rejected: {0}")]
    ValidationRejected(String),
}

impl AttemptError {
    pub const fn kind(&self) -> AttemptErrorKind {
        match self {
            Self::CredentialUnavailable => AttemptErrorKind::CredentialUnavailable,
            Self::Completion(CompletionError::Transport { .. }) => AttemptErrorKind::TransportError,
            Self::Completion(CompletionError::Timeout) => AttemptErrorKind::Timeout,
            Self::Completion(
                CompletionError::MalformedResponse(_) | CompletionError::MissingCompletion,
            ) => AttemptErrorKind::ResponseFormatError,
            Self::ValidationRejected(_) => AttemptErrorKind::ValidationRejected,
        }
    }
}

/// Caller-visible outcome of a failed request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RelayError {
    #[error("No credential configured")]
    CredentialUnavailable,

    #[error("Translation failed after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("Relay worker pool is closed")]
    PoolClosed,
}

/// Shared stores the engine reads and updates.
#[derive(Debug, Clone)]
pub struct RelayServices {
    pub glossary: Arc<GlossaryStore>,
    pub rules: Arc<RuleEngine>,
    pub keys: Arc<KeyRotator>,
    pub context: Arc<ContextManager>,
    pub usage: Arc<UsageMeter>,
}

impl RelayServices {
    /// Empty stores sized for `max_clients` client contexts.
    pub fn new(max_clients: usize) -> Self {
        Self {
            glossary: Arc::new(GlossaryStore::in_memory()),
            rules: Arc::new(RuleEngine::new()),
            keys: Arc::new(KeyRotator::default()),
            context: Arc::new(ContextManager::new(max_clients)),
            usage: Arc::new(UsageMeter::new()),
        }
    }
}

/// Outbound conversation for one attempt.
struct Prompt {
    messages: Vec<ChatMessage>,
    extraction: bool,
}

/// The translation relay.
pub struct RelayEngine {
    config: SharedConfig,
    services: RelayServices,
    completions: Arc<dyn ChatCompletionPort>,
    events: Arc<dyn RelayEventEmitter>,
    policy: RetryPolicy,
    permits: Semaphore,
}

impl std::fmt::Debug for RelayEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayEngine")
            .field("config", &self.config)
            .field("policy", &self.policy)
            .field("available_permits", &self.permits.available_permits())
            .finish_non_exhaustive()
    }
}

impl RelayEngine {
    /// Build an engine and load the credential pool, glossary and rules
    /// named by `config`.
    ///
    /// The worker count is fixed here; later config updates do not resize it.
    pub fn new(
        config: RelayConfig,
        services: RelayServices,
        completions: Arc<dyn ChatCompletionPort>,
        events: Arc<dyn RelayEventEmitter>,
    ) -> Self {
        let engine = Self {
            permits: Semaphore::new(config.workers.max(1)),
            config: SharedConfig::new(config.clone()),
            services,
            completions,
            events,
            policy: RetryPolicy::default(),
        };
        engine.install(&config);
        engine
    }

    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Swap in a new configuration snapshot.
    ///
    /// In-flight attempts finish with the snapshot they started with.
    pub fn apply_config(&self, config: RelayConfig) {
        self.install(&config);
        let previous = self.config.replace(config);
        debug!(previous_model = %previous.model, "Relay configuration replaced");
    }

    /// The active configuration snapshot.
    pub fn config(&self) -> Arc<RelayConfig> {
        self.config.snapshot()
    }

    pub const fn services(&self) -> &RelayServices {
        &self.services
    }

    /// Stop handing out worker permits. Queued and future requests fail with
    /// [`RelayError::PoolClosed`]; requests already running complete.
    pub fn close(&self) {
        self.permits.close();
    }

    fn install(&self, config: &RelayConfig) {
        self.services.keys.reconfigure(config.credentials());
        self.services.context.resize(config.max_clients);

        match config.glossary_path.as_deref() {
            Some(path) => {
                if config.glossary_enabled {
                    match self.services.glossary.reload(path) {
                        Ok(count) => info!(terms = count, "Glossary loaded"),
                        Err(e) => warn!("{e}"),
                    }
                }
                if let Err(e) = self.services.rules.load_beside(path) {
                    warn!("{e}");
                }
            }
            None => self.services.rules.clear(),
        }
    }

    /// Translate `text` for the client at `client_addr` (IP, no port).
    ///
    /// Blank input short-circuits to an empty translation.
    pub async fn translate(&self, text: &str, client_addr: &str) -> Result<String, RelayError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(String::new());
        }

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| RelayError::PoolClosed)?;

        let client = client_key(client_addr);
        info!(client = %client, "Translation request: {text}");
        self.events.emit(RelayEvent::RequestReceived {
            client: client.clone(),
            text: text.to_string(),
        });

        let max_attempts = self.policy.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            if attempt > 1 {
                info!(attempt, max_attempts, "Retrying translation");
                self.events.emit(RelayEvent::RetryScheduled {
                    attempt,
                    max_attempts,
                });
                tokio::time::sleep(self.policy.delay).await;
            }

            match self.attempt(text, &client).await {
                Ok(translation) => {
                    info!(client = %client, attempt, "Translated: {translation}");
                    self.events.emit(RelayEvent::Translated {
                        client,
                        text: translation.clone(),
                    });
                    return Ok(translation);
                }
                Err(e) => {
                    warn!(attempt, kind = ?e.kind(), "Attempt failed: {e}");
                    self.events.emit(RelayEvent::AttemptFailed {
                        attempt,
                        kind: e.kind(),
                        message: e.to_string(),
                    });
                    if e == AttemptError::CredentialUnavailable {
                        return Err(self.fail(client, RelayError::CredentialUnavailable));
                    }
                }
            }
        }

        Err(self.fail(
            client,
            RelayError::RetriesExhausted {
                attempts: max_attempts,
            },
        ))
    }

    fn fail(&self, client: String, error: RelayError) -> RelayError {
        warn!(client = %client, "{error}");
        self.events.emit(RelayEvent::RequestFailed {
            client,
            reason: error.to_string(),
        });
        error
    }

    async fn attempt(&self, text: &str, client: &str) -> Result<String, AttemptError> {
        let config = self.config.snapshot();
        let credential = self
            .services
            .keys
            .draw()
            .ok_or(AttemptError::CredentialUnavailable)?;

        let processed = self.services.rules.apply_pre(text);
        let user_turn = format!("{}{processed}", config.pre_prompt);
        let prompt = self.compose(&config, &processed, client, &user_turn);

        let request = CompletionRequest {
            url: config.completions_url(),
            credential,
            model: config.model.clone(),
            messages: prompt.messages,
            temperature: config.temperature,
        };
        let reply = tokio::time::timeout(self.policy.request_timeout, self.completions.complete(&request))
            .await
            .map_err(|_| CompletionError::Timeout)??;
        if let Some(usage) = reply.usage {
            let totals = self.services.usage.record(usage);
            debug!(total_tokens = totals.total_tokens, "Token usage updated");
            self.events.emit(RelayEvent::TokenUsage { usage, totals });
        }
        let raw = reply.content;

        let translated = if prompt.extraction {
            self.parse_extraction_reply(&raw, &processed).await
        } else {
            strip_thinking(&raw)
        };
        let result = self.services.rules.apply_post(&translated);

        if let Some(reason) = config.validation.rejection_reason(&result) {
            return Err(AttemptError::ValidationRejected(reason));
        }

        self.services
            .context
            .record(client, Turn::new(user_turn, result.clone()), config.context_depth);
        Ok(result)
    }

    fn compose(&self, config: &RelayConfig, processed: &str, client: &str, user_turn: &str) -> Prompt {
        let mut system = config.system_prompt.clone();
        let mut extraction = false;

        if config.glossary_enabled {
            let terms = self.services.glossary.matching_terms(processed);
            if !terms.is_empty() {
                debug!(count = terms.len(), "Glossary terms matched");
                self.events.emit(RelayEvent::TermsMatched { count: terms.len() });
                system.push_str("\n\n");
                system.push_str(&format_hint_block(&terms));
            }

            extraction = processed.chars().count() > config.extraction_min_chars
                && roll(config.extraction_probability);
            if extraction {
                system.push_str(EXTRACTION_INSTRUCTION);
            }
        }

        let history = self.services.context.history(client, config.context_depth);
        let mut messages = Vec::with_capacity(2 + history.len() * 2);
        messages.push(ChatMessage::system(system));
        messages.extend(history.iter().flat_map(Turn::to_messages));
        messages.push(ChatMessage::user(user_turn));

        Prompt {
            messages,
            extraction,
        }
    }

    async fn parse_extraction_reply(&self, raw: &str, processed: &str) -> String {
        let translation = match TRANSLATION_TAG.captures(raw) {
            Some(caps) => caps[1].trim().to_string(),
            None => {
                warn!("Reply is missing <tl> tags, stripping markup");
                self.events.emit(RelayEvent::FormatWarning {
                    raw: raw.to_string(),
                });
                ANY_TAG.replace_all(raw, "").trim().to_string()
            }
        };
        self.learn_terms(raw, processed).await;
        translation
    }

    /// Learn `<tm>` candidates whose source actually occurs in the input.
    ///
    /// Inserts append to the glossary file under its write lock, so they run
    /// on the blocking pool.
    async fn learn_terms(&self, raw: &str, processed: &str) {
        let folded_input = processed.to_lowercase();
        let candidates: Vec<(String, String)> = TERM_TAG
            .captures_iter(raw)
            .filter_map(|caps| caps.get(1))
            .flat_map(|block| block.as_str().lines())
            .filter_map(|line| line.split_once('='))
            .map(|(source, target)| (source.trim(), target.trim()))
            .filter(|(source, _)| !source.is_empty())
            .filter(|(source, _)| {
                let present = folded_input.contains(&source.to_lowercase());
                if !present {
                    debug!(source, "Ignoring term absent from input");
                }
                present
            })
            .map(|(source, target)| (source.to_string(), target.to_string()))
            .collect();
        if candidates.is_empty() {
            return;
        }

        let glossary = Arc::clone(&self.services.glossary);
        let learned = tokio::task::spawn_blocking(move || {
            candidates
                .into_iter()
                .filter(|(source, target)| glossary.learn(source, target).is_inserted())
                .collect::<Vec<_>>()
        })
        .await;

        match learned {
            Ok(learned) => {
                for (source, target) in learned {
                    info!(source = %source, target = %target, "Learned glossary term");
                    self.events.emit(RelayEvent::TermLearned { source, target });
                }
            }
            Err(e) => warn!("Glossary insert task failed: {e}"),
        }
    }
}

fn roll(probability: f64) -> bool {
    if !probability.is_finite() || probability <= 0.0 {
        return false;
    }
    rand::thread_rng().gen_bool(probability.min(1.0))
}

fn strip_thinking(raw: &str) -> String {
    THINK_BLOCK.replace_all(raw, "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempt_error_kinds() {
        assert_eq!(
            AttemptError::CredentialUnavailable.kind(),
            AttemptErrorKind::CredentialUnavailable
        );
        let transport = AttemptError::from(CompletionError::Transport {
            status: Some(502),
            message: "bad gateway".to_string(),
        });
        assert_eq!(transport.kind(), AttemptErrorKind::TransportError);
        assert_eq!(
            AttemptError::from(CompletionError::Timeout).kind(),
            AttemptErrorKind::Timeout
        );
        assert_eq!(
            AttemptError::from(CompletionError::MissingCompletion).kind(),
            AttemptErrorKind::ResponseFormatError
        );
        assert_eq!(
            AttemptError::ValidationRejected("empty".to_string()).kind(),
            AttemptErrorKind::ValidationRejected
        );
    }

    #[test]
    fn test_strip_thinking_removes_reasoning_block() {
        let raw = "<think>\nThe user wants Chinese.\n</think>\n\n  你好 ";
        assert_eq!(strip_thinking(raw), "你好");
        assert_eq!(strip_thinking("<THINK>x</THINK>ok"), "ok");
    }

    #[test]
    fn test_roll_edges() {
        assert!(!roll(0.0));
        assert!(!roll(f64::NAN));
        assert!(roll(1.0));
        assert!(roll(3.0));
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.delay, Duration::from_secs(1));
        assert_eq!(policy.request_timeout, Duration::from_secs(30));
    }
}
