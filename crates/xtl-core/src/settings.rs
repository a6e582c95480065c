//! Relay configuration snapshot and validation.
//!
//! A [`RelayConfig`] is never mutated in place. Updates build a new value and
//! swap it into [`SharedConfig`]; readers hold an `Arc` to whichever snapshot
//! was current when they started.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Default port the relay listens on (XUnity `Endpoint=http://localhost:6800`).
pub const DEFAULT_RELAY_PORT: u16 = 6800;

/// Default number of requests serviced concurrently.
pub const DEFAULT_WORKERS: usize = 8;

/// Default number of (request, response) pairs replayed per client.
pub const DEFAULT_CONTEXT_DEPTH: usize = 5;

/// Default cap on the number of client contexts kept in memory.
pub const DEFAULT_MAX_CLIENTS: usize = 1024;

/// Default chance that an attempt asks the model to extract new terms.
pub const DEFAULT_EXTRACTION_PROBABILITY: f64 = 0.33;

/// Pre-processed text must be longer than this (in chars) for extraction mode.
pub const DEFAULT_EXTRACTION_MIN_CHARS: usize = 8;

const DEFAULT_SYSTEM_PROMPT: &str =
    "你是一个游戏翻译模型，可以流畅通顺地将任意的游戏文本翻译成简体中文。";
const DEFAULT_PRE_PROMPT: &str = "将下面的文本翻译成简体中文：";

/// Rules deciding whether a model reply counts as a translation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ValidationRules {
    /// Replies starting with this marker are treated as errors.
    pub error_marker: String,
    /// Replies containing any of these phrases (case-insensitive) are rejected.
    pub failure_phrases: Vec<String>,
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self {
            error_marker: "Error".to_string(),
            failure_phrases: vec!["翻译失败".to_string(), "translation failed".to_string()],
        }
    }
}

impl ValidationRules {
    /// Returns the reason a reply is rejected, or `None` if it is acceptable.
    pub fn rejection_reason(&self, text: &str) -> Option<String> {
        if text.is_empty() {
            return Some("empty translation".to_string());
        }
        if !self.error_marker.is_empty() && text.starts_with(&self.error_marker) {
            return Some(format!("reply starts with error marker '{}'", self.error_marker));
        }
        let folded = text.to_lowercase();
        self.failure_phrases
            .iter()
            .find(|phrase| !phrase.is_empty() && folded.contains(&phrase.to_lowercase()))
            .map(|phrase| format!("reply contains failure phrase '{phrase}'"))
    }
}

/// Immutable relay configuration snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RelayConfig {
    /// Base URL of the chat-completions API (without `/chat/completions`).
    pub endpoint: String,
    /// Comma-separated credential list.
    pub api_keys: String,
    /// Model identifier sent with every request.
    pub model: String,
    /// Host the relay binds to.
    pub host: String,
    /// Port the relay binds to.
    pub port: u16,
    /// Number of requests serviced concurrently.
    pub workers: usize,
    /// System message sent first in every conversation.
    pub system_prompt: String,
    /// Prefix prepended to every user message.
    pub pre_prompt: String,
    /// Number of previous turns replayed per client.
    pub context_depth: usize,
    /// Sampling temperature.
    pub temperature: f64,
    /// Whether glossary hints and term learning are active.
    pub glossary_enabled: bool,
    /// Glossary file; rule files are looked up in the same directory.
    pub glossary_path: Option<PathBuf>,
    /// Chance (0..=1) that an eligible attempt runs in extraction mode.
    pub extraction_probability: f64,
    /// Minimum pre-processed length (exclusive) for extraction mode.
    pub extraction_min_chars: usize,
    /// Maximum number of client contexts kept in memory.
    pub max_clients: usize,
    /// Reply validation rules.
    pub validation: ValidationRules,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl RelayConfig {
    /// Create a configuration with sensible defaults.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1".to_string(),
            api_keys: String::new(),
            model: "gpt-3.5-turbo".to_string(),
            host: "127.0.0.1".to_string(),
            port: DEFAULT_RELAY_PORT,
            workers: DEFAULT_WORKERS,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            pre_prompt: DEFAULT_PRE_PROMPT.to_string(),
            context_depth: DEFAULT_CONTEXT_DEPTH,
            temperature: 1.0,
            glossary_enabled: false,
            glossary_path: None,
            extraction_probability: DEFAULT_EXTRACTION_PROBABILITY,
            extraction_min_chars: DEFAULT_EXTRACTION_MIN_CHARS,
            max_clients: DEFAULT_MAX_CLIENTS,
            validation: ValidationRules::default(),
        }
    }

    /// Trimmed, non-empty credentials in configured order.
    pub fn credentials(&self) -> Vec<String> {
        self.api_keys
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(ToString::to_string)
            .collect()
    }

    /// Full URL of the chat-completions route.
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.endpoint.trim_end_matches('/'))
    }
}

/// Configuration validation error.
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("Endpoint cannot be empty")]
    EmptyEndpoint,

    #[error("Model name cannot be empty")]
    EmptyModel,

    #[error("Worker pool needs at least one worker")]
    NoWorkers,

    #[error("Temperature must be between 0.0 and 2.0, got {0}")]
    InvalidTemperature(f64),

    #[error("Extraction probability must be between 0.0 and 1.0, got {0}")]
    InvalidProbability(f64),

    #[error("Client cap must be at least 1")]
    NoClients,

    #[error("Glossary is enabled but no glossary path is set")]
    MissingGlossaryPath,
}

/// Validate configuration values.
pub fn validate_config(config: &RelayConfig) -> Result<(), ConfigError> {
    if config.endpoint.trim().is_empty() {
        return Err(ConfigError::EmptyEndpoint);
    }
    if config.model.trim().is_empty() {
        return Err(ConfigError::EmptyModel);
    }
    if config.workers == 0 {
        return Err(ConfigError::NoWorkers);
    }
    if !(0.0..=2.0).contains(&config.temperature) {
        return Err(ConfigError::InvalidTemperature(config.temperature));
    }
    if !(0.0..=1.0).contains(&config.extraction_probability) {
        return Err(ConfigError::InvalidProbability(config.extraction_probability));
    }
    if config.max_clients == 0 {
        return Err(ConfigError::NoClients);
    }
    if config.glossary_enabled && config.glossary_path.is_none() {
        return Err(ConfigError::MissingGlossaryPath);
    }
    Ok(())
}

/// Atomically replaceable handle to the active configuration.
#[derive(Debug)]
pub struct SharedConfig {
    current: RwLock<Arc<RelayConfig>>,
}

impl SharedConfig {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            current: RwLock::new(Arc::new(config)),
        }
    }

    /// The snapshot active right now.
    pub fn snapshot(&self) -> Arc<RelayConfig> {
        Arc::clone(&*self.current.read())
    }

    /// Swap in a new snapshot, returning the previous one.
    pub fn replace(&self, config: RelayConfig) -> Arc<RelayConfig> {
        std::mem::replace(&mut *self.current.write(), Arc::new(config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = RelayConfig::with_defaults();
        assert_eq!(config.port, 6800);
        assert_eq!(config.context_depth, 5);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_credentials_are_trimmed_and_filtered() {
        let config = RelayConfig {
            api_keys: " sk-a, ,sk-b ,,sk-c".to_string(),
            ..RelayConfig::with_defaults()
        };
        assert_eq!(config.credentials(), vec!["sk-a", "sk-b", "sk-c"]);
    }

    #[test]
    fn test_completions_url_strips_trailing_slash() {
        let config = RelayConfig {
            endpoint: "http://localhost:1234/v1/".to_string(),
            ..RelayConfig::with_defaults()
        };
        assert_eq!(
            config.completions_url(),
            "http://localhost:1234/v1/chat/completions"
        );
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let base = RelayConfig::with_defaults();

        let config = RelayConfig {
            workers: 0,
            ..base.clone()
        };
        assert_eq!(validate_config(&config), Err(ConfigError::NoWorkers));

        let config = RelayConfig {
            temperature: 2.5,
            ..base.clone()
        };
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::InvalidTemperature(_))
        ));

        let config = RelayConfig {
            extraction_probability: -0.1,
            ..base.clone()
        };
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::InvalidProbability(_))
        ));

        let config = RelayConfig {
            glossary_enabled: true,
            ..base
        };
        assert_eq!(
            validate_config(&config),
            Err(ConfigError::MissingGlossaryPath)
        );
    }

    #[test]
    fn test_validation_rules() {
        let rules = ValidationRules::default();
        assert!(rules.rejection_reason("你好").is_none());
        assert!(rules.rejection_reason("").is_some());
        assert!(rules.rejection_reason("Error: quota exceeded").is_some());
        assert!(rules.rejection_reason("抱歉，翻译失败了").is_some());
        assert!(rules.rejection_reason("Sorry, Translation Failed.").is_some());
    }

    #[test]
    fn test_shared_config_replace_keeps_old_snapshot_alive() {
        let shared = SharedConfig::new(RelayConfig::with_defaults());
        let before = shared.snapshot();

        let updated = RelayConfig {
            model: "deepseek-chat".to_string(),
            ..RelayConfig::with_defaults()
        };
        shared.replace(updated);

        assert_eq!(before.model, "gpt-3.5-turbo");
        assert_eq!(shared.snapshot().model, "deepseek-chat");
    }

    #[test]
    fn test_config_deserializes_partial_json() {
        let config: RelayConfig =
            serde_json::from_str(r#"{"model": "qwen", "context_depth": 2}"#).unwrap();
        assert_eq!(config.model, "qwen");
        assert_eq!(config.context_depth, 2);
        assert_eq!(config.port, DEFAULT_RELAY_PORT);
    }
}
