//! Relay event stream.
//!
//! Every notable step of a relay request is published as a [`RelayEvent`]
//! through the [`RelayEventEmitter`](crate::ports::RelayEventEmitter) port.
//! Consumers (console printers, GUIs, tests) subscribe on the adapter side.
//!
//! # Wire Format
//!
//! Events are serialized with a `type` tag:
//!
//! ```json
//! { "type": "term_learned", "source": "Arthur", "target": "亚瑟" }
//! ```

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::domain::TokenUsage;
use crate::services::AttemptErrorKind;

/// Events emitted by the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayEvent {
    // ========== Server Events ==========
    /// The relay is listening.
    ServerStarted {
        address: SocketAddr,
        workers: usize,
    },

    /// The relay stopped accepting connections.
    ServerStopped,

    // ========== Request Events ==========
    /// A translation request arrived.
    RequestReceived {
        client: String,
        text: String,
    },

    /// Glossary terms were found in the request text.
    TermsMatched {
        count: usize,
    },

    /// An attempt failed and another one is about to start.
    RetryScheduled {
        attempt: u32,
        max_attempts: u32,
    },

    /// A single attempt failed.
    AttemptFailed {
        attempt: u32,
        kind: AttemptErrorKind,
        message: String,
    },

    /// Extraction mode was requested but the reply lacked translation tags.
    FormatWarning {
        raw: String,
    },

    /// The remote reported token usage for a call.
    TokenUsage {
        usage: TokenUsage,
        totals: TokenUsage,
    },

    /// A new glossary term was learned from a model reply.
    TermLearned {
        source: String,
        target: String,
    },

    /// A request completed with a translation.
    Translated {
        client: String,
        text: String,
    },

    /// A request gave up.
    RequestFailed {
        client: String,
        reason: String,
    },
}

impl RelayEvent {
    /// Short name of the event variant, used as a log field.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ServerStarted { .. } => "server_started",
            Self::ServerStopped => "server_stopped",
            Self::RequestReceived { .. } => "request_received",
            Self::TermsMatched { .. } => "terms_matched",
            Self::RetryScheduled { .. } => "retry_scheduled",
            Self::AttemptFailed { .. } => "attempt_failed",
            Self::FormatWarning { .. } => "format_warning",
            Self::TokenUsage { .. } => "token_usage",
            Self::TermLearned { .. } => "term_learned",
            Self::Translated { .. } => "translated",
            Self::RequestFailed { .. } => "request_failed",
        }
    }
}
