//! Connection registry: user id → live connection handle.
//!
//! The registry is the single source of truth for "is user X reachable right
//! now and through which handle". It owns the Connection Session entries
//! exclusively; persisted presence is a best-effort shadow written by the
//! connection lifecycle, never consulted for routing.
//!
//! # Thread Safety
//!
//! All operations are thread-safe via DashMap. Mutations take a shard lock;
//! lookups are concurrent and never await, so no guard is ever held across a
//! suspension point.

use crate::events::ServerEvent;
use dashmap::DashMap;
use tokio::sync::mpsc;

/// Registry of live connection handles, one per user id.
pub struct ConnectionRegistry {
    sessions: DashMap<String, mpsc::Sender<ServerEvent>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Associate `handle` with `user_id`, superseding any prior handle
    /// (idempotent last-writer-wins).
    pub fn register(&self, user_id: &str, handle: mpsc::Sender<ServerEvent>) {
        self.sessions.insert(user_id.to_string(), handle);
        crate::metrics::set_connected_users(self.sessions.len() as i64);
    }

    /// Remove the association for `user_id`. Safe to call when the user was
    /// never registered (no-op, not an error).
    pub fn unregister(&self, user_id: &str) {
        self.sessions.remove(user_id);
        crate::metrics::set_connected_users(self.sessions.len() as i64);
    }

    /// Remove the association only if `handle` is still the registered one.
    ///
    /// A superseded connection's cleanup must not evict the registration of
    /// the connection that replaced it. Returns whether a removal happened.
    pub fn unregister_session(&self, user_id: &str, handle: &mpsc::Sender<ServerEvent>) -> bool {
        let removed = self
            .sessions
            .remove_if(user_id, |_, current| current.same_channel(handle))
            .is_some();
        crate::metrics::set_connected_users(self.sessions.len() as i64);
        removed
    }

    /// Look up the live handle for `user_id`. Never blocks; `None` when the
    /// user is offline.
    pub fn lookup(&self, user_id: &str) -> Option<mpsc::Sender<ServerEvent>> {
        self.sessions.get(user_id).map(|entry| entry.value().clone())
    }

    /// Whether `user_id` currently has a registered connection.
    pub fn is_online(&self, user_id: &str) -> bool {
        self.sessions.contains_key(user_id)
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
