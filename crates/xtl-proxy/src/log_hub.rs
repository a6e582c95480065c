//! Relay event streaming.
//!
//! Every event emitted by the engine or the supervisor is stamped, kept in a
//! bounded backlog and broadcast to live subscribers. Late subscribers read
//! the backlog first.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use xtl_core::{RelayEvent, RelayEventEmitter};

/// Maximum number of entries kept in the backlog.
pub const MAX_BACKLOG: usize = 1000;

const CHANNEL_CAPACITY: usize = 256;

/// A stamped relay event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayLogEntry {
    /// Position in the stream, starting at 0.
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub event: RelayEvent,
}

#[derive(Debug, Default)]
struct Backlog {
    entries: VecDeque<RelayLogEntry>,
    next_seq: u64,
}

/// Broadcast hub implementing [`RelayEventEmitter`].
pub struct RelayLogHub {
    backlog: Mutex<Backlog>,
    capacity: usize,
    broadcast_tx: broadcast::Sender<RelayLogEntry>,
}

impl RelayLogHub {
    pub fn new() -> Self {
        Self::with_capacity(MAX_BACKLOG)
    }

    /// Hub keeping at most `capacity` entries of backlog.
    pub fn with_capacity(capacity: usize) -> Self {
        let (broadcast_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            backlog: Mutex::new(Backlog::default()),
            capacity: capacity.max(1),
            broadcast_tx,
        }
    }

    /// Receiver for entries emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<RelayLogEntry> {
        self.broadcast_tx.subscribe()
    }

    /// Copy of the backlog, oldest first.
    pub fn backlog(&self) -> Vec<RelayLogEntry> {
        self.backlog.lock().entries.iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.backlog.lock().entries.clear();
    }
}

impl Default for RelayLogHub {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RelayLogHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayLogHub")
            .field("capacity", &self.capacity)
            .field("subscribers", &self.broadcast_tx.receiver_count())
            .finish_non_exhaustive()
    }
}

impl RelayEventEmitter for RelayLogHub {
    fn emit(&self, event: RelayEvent) {
        debug!(event = event.name(), "Relay event");

        // Sequence, backlog and broadcast stay in one order under the lock.
        let mut backlog = self.backlog.lock();
        let entry = RelayLogEntry {
            seq: backlog.next_seq,
            timestamp: Utc::now(),
            event,
        };
        backlog.next_seq += 1;
        if backlog.entries.len() >= self.capacity {
            backlog.entries.pop_front();
        }
        backlog.entries.push_back(entry.clone());

        // No receivers is fine
        let _ = self.broadcast_tx.send(entry);
    }
}
