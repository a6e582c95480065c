//! Event emitter trait for relay event broadcasting.
//!
//! Implementations handle transport details (broadcast channels, GUIs,
//! console printers). Emission is fire-and-forget and must not block.

use crate::events::RelayEvent;

/// Trait for emitting relay events.
///
/// # Implementations
///
/// - `NoopEmitter` - For tests and contexts without listeners
/// - `RelayLogHub` in `xtl-proxy` - broadcast channel with backlog
pub trait RelayEventEmitter: Send + Sync {
    /// Emit a relay event.
    fn emit(&self, event: RelayEvent);
}

/// A no-op event emitter.
#[derive(Debug, Clone, Default)]
pub struct NoopEmitter;

impl NoopEmitter {
    pub const fn new() -> Self {
        Self
    }
}

impl RelayEventEmitter for NoopEmitter {
    fn emit(&self, _event: RelayEvent) {
        // Intentionally do nothing
    }
}
