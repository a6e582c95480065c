//! Core library for the xtl translation relay.
//!
//! This crate holds the pure domain and orchestration logic. It contains no
//! HTTP server or HTTP client code; those live in `xtl-proxy` behind the
//! traits in [`ports`].
//!
//! # Structure
//!
//! - `domain` - chat messages and conversation turns
//! - `settings` - configuration snapshot, validation and atomic swapping
//! - `events` - the relay event stream
//! - `ports` - trait abstractions for the remote model and event sinks
//! - `services` - rule engine, glossary, key rotation, client contexts and
//!   the relay engine

#![cfg_attr(not(test), deny(unused_crate_dependencies))]

pub mod domain;
pub mod events;
pub mod ports;
pub mod services;
pub mod settings;

pub use domain::{ChatMessage, MessageRole, TokenUsage, Turn};
pub use events::RelayEvent;
pub use ports::{
    ChatCompletion, ChatCompletionPort, CompletionError, CompletionRequest, NoopEmitter,
    RelayEventEmitter,
};
pub use services::{
    AttemptError, AttemptErrorKind, ContextManager, FAILURE_BODY, GlossaryStore, KeyRotator,
    RelayEngine, RelayError, RelayServices, RetryPolicy, RuleEngine, UsageMeter, client_key,
};
pub use settings::{ConfigError, RelayConfig, SharedConfig, ValidationRules, validate_config};
