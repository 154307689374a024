//! Event router: best-effort delivery to live connections.
//!
//! Given a target user and a named event, deliver exactly once to that
//! user's connection if present; drop silently if absent. This is a
//! real-time channel, not a durable outbox - no queuing, no retry. Callers
//! persist state *before* routing, so a miss never loses data.

use crate::events::ServerEvent;
use crate::state::ConnectionRegistry;
use std::sync::Arc;
use tracing::debug;

/// Routes server events through the connection registry.
#[derive(Clone)]
pub struct EventRouter {
    registry: Arc<ConnectionRegistry>,
}

impl EventRouter {
    /// Create a router over the given registry.
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Deliver `event` to `user_id`'s live connection.
    ///
    /// Returns whether the event was queued. An offline target or a
    /// full/closed outbound queue is a silent miss: counted, logged at
    /// debug, never surfaced to the initiating caller. The send is
    /// non-blocking, so no registry state is held across a suspension point.
    pub fn deliver(&self, user_id: &str, event: ServerEvent) -> bool {
        let name = event.name();

        let Some(handle) = self.registry.lookup(user_id) else {
            debug!(user_id = %user_id, event = %name, "Delivery miss: user offline");
            crate::metrics::record_delivery_miss(name);
            return false;
        };

        match handle.try_send(event) {
            Ok(()) => {
                crate::metrics::record_delivery(name);
                true
            }
            Err(e) => {
                debug!(user_id = %user_id, event = %name, error = %e, "Delivery miss: queue unavailable");
                crate::metrics::record_delivery_miss(name);
                false
            }
        }
    }

    /// Deliver independently to both parties of a two-sided notification.
    ///
    /// Failure to reach one party does not block delivery to the other, and
    /// never rolls back the persisted state change that triggered it.
    pub fn deliver_both(&self, first: (&str, ServerEvent), second: (&str, ServerEvent)) {
        self.deliver(first.0, first.1);
        self.deliver(second.0, second.1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn ack(id: &str) -> ServerEvent {
        ServerEvent::RequestSent {
            request_id: id.to_string(),
            message: "Request sent".to_string(),
        }
    }

    #[tokio::test]
    async fn delivers_to_registered_user() {
        let registry = Arc::new(ConnectionRegistry::new());
        let router = EventRouter::new(registry.clone());
        let (tx, mut rx) = mpsc::channel(8);

        registry.register("alice", tx);
        assert!(router.deliver("alice", ack("r1")));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.name(), "request_sent");
    }

    #[tokio::test]
    async fn offline_target_is_silent_miss() {
        let registry = Arc::new(ConnectionRegistry::new());
        let router = EventRouter::new(registry);

        assert!(!router.deliver("nobody", ack("r1")));
    }

    #[tokio::test]
    async fn full_queue_is_silent_miss() {
        let registry = Arc::new(ConnectionRegistry::new());
        let router = EventRouter::new(registry.clone());
        let (tx, _rx) = mpsc::channel(1);

        registry.register("alice", tx);
        assert!(router.deliver("alice", ack("r1")));
        // Queue is full now; the next delivery drops instead of blocking
        assert!(!router.deliver("alice", ack("r2")));
    }

    #[tokio::test]
    async fn one_sided_miss_does_not_block_the_other() {
        let registry = Arc::new(ConnectionRegistry::new());
        let router = EventRouter::new(registry.clone());
        let (tx, mut rx) = mpsc::channel(8);

        registry.register("bob", tx);
        router.deliver_both(("alice", ack("r1")), ("bob", ack("r2")));

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, ServerEvent::RequestSent { request_id, .. } if request_id == "r2"));
    }
}
