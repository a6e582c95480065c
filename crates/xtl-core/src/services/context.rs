//! Per-client conversation memory.
//!
//! Clients are keyed by [`client_key`], a short SHA-256 prefix of their
//! network address. Each client keeps the most recent turns up to the
//! configured depth. The map itself is an LRU bounded by `max_clients`.

use std::collections::VecDeque;
use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use crate::domain::Turn;

/// Length of the hex client key.
const CLIENT_KEY_LEN: usize = 8;

/// Privacy-preserving client key: first 8 hex chars of SHA-256(`address`).
pub fn client_key(address: &str) -> String {
    let digest = Sha256::digest(address.as_bytes());
    let mut hex = format!("{digest:x}");
    hex.truncate(CLIENT_KEY_LEN);
    hex
}

/// Bounded history for one client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientContext {
    history: VecDeque<Turn>,
    max_depth: usize,
}

impl ClientContext {
    fn with_depth(max_depth: usize) -> Self {
        Self {
            history: VecDeque::with_capacity(max_depth),
            max_depth,
        }
    }

    /// Apply `depth` and drop the oldest turns beyond it.
    fn trim_to(&mut self, depth: usize) {
        self.max_depth = depth;
        while self.history.len() > self.max_depth {
            self.history.pop_front();
        }
    }

    pub fn turns(&self) -> impl Iterator<Item = &Turn> {
        self.history.iter()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub const fn max_depth(&self) -> usize {
        self.max_depth
    }
}

/// Shared map of client contexts.
///
/// Every operation runs its lookup, creation and trimming under one lock so
/// concurrent requests from the same client never interleave half-updates.
#[derive(Debug)]
pub struct ContextManager {
    clients: Mutex<LruCache<String, ClientContext>>,
}

impl ContextManager {
    pub fn new(max_clients: usize) -> Self {
        let cap = NonZeroUsize::new(max_clients).unwrap_or(NonZeroUsize::MIN);
        Self {
            clients: Mutex::new(LruCache::new(cap)),
        }
    }

    /// Get or create the client context, re-trim it to `depth`, and return
    /// a copy of its turns oldest first.
    pub fn history(&self, key: &str, depth: usize) -> Vec<Turn> {
        let mut clients = self.clients.lock();
        let ctx = clients.get_or_insert_mut(key.to_string(), || ClientContext::with_depth(depth));
        ctx.trim_to(depth);
        ctx.history.iter().cloned().collect()
    }

    /// Append a turn and trim to `depth`.
    pub fn record(&self, key: &str, turn: Turn, depth: usize) {
        let mut clients = self.clients.lock();
        let ctx = clients.get_or_insert_mut(key.to_string(), || ClientContext::with_depth(depth));
        ctx.history.push_back(turn);
        ctx.trim_to(depth);
    }

    /// Re-apply `depth` to one client without touching its recency.
    pub fn trim(&self, key: &str, depth: usize) {
        if let Some(ctx) = self.clients.lock().peek_mut(key) {
            ctx.trim_to(depth);
        }
    }

    /// Copy of a client's context, if it exists.
    pub fn get(&self, key: &str) -> Option<ClientContext> {
        self.clients.lock().peek(key).cloned()
    }

    /// Number of tracked clients.
    pub fn client_count(&self) -> usize {
        self.clients.lock().len()
    }

    /// Change the client cap, evicting least recently used clients if needed.
    pub fn resize(&self, max_clients: usize) {
        let cap = NonZeroUsize::new(max_clients).unwrap_or(NonZeroUsize::MIN);
        self.clients.lock().resize(cap);
    }
}
