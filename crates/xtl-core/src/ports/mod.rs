//! Port definitions (trait abstractions) for external systems.
//!
//! Ports define the interfaces the relay core expects from infrastructure.
//! They contain no HTTP client or server details and use only domain types.

pub mod chat_completion;
pub mod event_emitter;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use chat_completion::{
    ChatCompletion, ChatCompletionPort, CompletionError, CompletionRequest,
};
pub use event_emitter::{NoopEmitter, RelayEventEmitter};
