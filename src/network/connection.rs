//! Connection - Handles an individual client connection.
//!
//! Each Connection runs in its own Tokio task:
//!
//! ```text
//!    ┌─────────────────────────────────────────────────────┐
//!    │              Connection Task                        │
//!    │                                                     │
//!    │  ┌─────────────────┐       ┌──────────────────┐     │
//!    │  │  ws receiver    │       │   ws sender      │     │
//!    │  └────────┬────────┘       └────────▲─────────┘     │
//!    │           │                         │               │
//!    │           ▼                         │               │
//!    │    tokio::select! ─▶ [Handlers] ─▶ [Outgoing Queue] │
//!    │                                                     │
//!    └─────────────────────────────────────────────────────┘
//! ```
//!
//! The outgoing queue doubles as this user's registered connection handle:
//! the Event Router pushes routed events into it from other users' tasks.
//!
//! Registration happens before the loop, cleanup after it, unconditionally -
//! an in-flight handler for this connection may complete later, but its
//! routing attempt will simply miss the registry.

use crate::config::LimitsConfig;
use crate::db::{Database, Presence};
use crate::dispatch::MessageDispatcher;
use crate::error::EventError;
use crate::events::{ClientEvent, ServerEvent};
use crate::handlers::{self, Context};
use crate::network::limit::RateLimiter;
use crate::router::EventRouter;
use crate::state::ConnectionRegistry;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, instrument, warn};

/// Outbound queue depth per connection. Full queue = best-effort drop.
const OUTGOING_QUEUE_SIZE: usize = 64;

/// A client connection handler.
pub struct Connection {
    user_id: Option<String>,
    addr: SocketAddr,
    registry: Arc<ConnectionRegistry>,
    router: EventRouter,
    dispatcher: MessageDispatcher,
    db: Database,
    limits: LimitsConfig,
}

impl Connection {
    /// Create a new connection handler.
    pub fn new(
        user_id: Option<String>,
        addr: SocketAddr,
        registry: Arc<ConnectionRegistry>,
        router: EventRouter,
        dispatcher: MessageDispatcher,
        db: Database,
        limits: LimitsConfig,
    ) -> Self {
        Self {
            user_id,
            addr,
            registry,
            router,
            dispatcher,
            db,
            limits,
        }
    }

    /// Run the connection event loop over an accepted WebSocket.
    #[instrument(skip(self, ws), fields(user_id = ?self.user_id, addr = %self.addr), name = "connection")]
    pub async fn run<S>(self, ws: WebSocketStream<S>) -> anyhow::Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        info!("Client connected");

        let (mut ws_sender, mut ws_receiver) = ws.split();

        // Outgoing queue: handler acks and events routed from other users
        let (outgoing_tx, mut outgoing_rx) = mpsc::channel::<ServerEvent>(OUTGOING_QUEUE_SIZE);

        // Presence registration if the handshake carried a user id
        if let Some(user_id) = &self.user_id {
            self.registry.register(user_id, outgoing_tx.clone());
            if let Err(e) = self.db.users().set_presence(user_id, Presence::Online).await {
                warn!(user_id = %user_id, error = %e, "Failed to persist online presence");
            }
            info!(user_id = %user_id, "Presence registered");
        }

        // Rate limiter for flood protection
        let mut rate_limiter = RateLimiter::new(self.limits.event_rate, self.limits.event_burst);

        loop {
            tokio::select! {
                inbound = ws_receiver.next() => {
                    match inbound {
                        Some(Ok(WsMessage::Text(raw))) => {
                            if !rate_limiter.check() {
                                warn!("Rate limit exceeded");
                                crate::metrics::record_rate_limited();
                                let kick = ServerEvent::Error {
                                    event: "flood".to_string(),
                                    code: "rate_limited".to_string(),
                                    message: "Event rate exceeded".to_string(),
                                };
                                if let Ok(json) = serde_json::to_string(&kick) {
                                    let _ = ws_sender.send(WsMessage::Text(json)).await;
                                }
                                break;
                            }

                            let event = match serde_json::from_str::<ClientEvent>(&raw) {
                                Ok(event) => event,
                                Err(e) => {
                                    debug!(error = %e, "Failed to parse event");
                                    let reply = ServerEvent::Error {
                                        event: "parse".to_string(),
                                        code: "invalid_payload".to_string(),
                                        message: e.to_string(),
                                    };
                                    let _ = outgoing_tx.try_send(reply);
                                    continue;
                                }
                            };

                            debug!(event = %event.name(), "Received event");

                            let ctx = Context {
                                user_id: self.user_id.as_deref(),
                                registry: &self.registry,
                                db: &self.db,
                                router: &self.router,
                                dispatcher: &self.dispatcher,
                                sender: &outgoing_tx,
                            };

                            match handlers::process(&ctx, event).await {
                                Ok(()) => {}
                                Err(EventError::End) => {
                                    info!("Client ended session");
                                    break;
                                }
                                Err(e) => {
                                    debug!(error = %e, "Connection channel unusable");
                                    break;
                                }
                            }
                        }
                        Some(Ok(WsMessage::Close(_))) => {
                            info!("Client sent close frame");
                            break;
                        }
                        // Binary frames and ping/pong are not part of the protocol
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!(error = %e, "Read error");
                            break;
                        }
                        None => {
                            info!("Client disconnected");
                            break;
                        }
                    }
                }

                Some(event) = outgoing_rx.recv() => {
                    let json = match serde_json::to_string(&event) {
                        Ok(json) => json,
                        Err(e) => {
                            warn!(error = %e, "Failed to serialize event");
                            continue;
                        }
                    };
                    if let Err(e) = ws_sender.send(WsMessage::Text(json)).await {
                        warn!(error = %e, "Write error");
                        break;
                    }
                }
            }
        }

        // Cleanup: drop the registration unless a newer connection for the
        // same user has superseded this one, and shadow presence to the store.
        if let Some(user_id) = &self.user_id
            && self.registry.unregister_session(user_id, &outgoing_tx)
        {
            if let Err(e) = self
                .db
                .users()
                .set_presence(user_id, Presence::Offline)
                .await
            {
                warn!(user_id = %user_id, error = %e, "Failed to persist offline presence");
            }
            info!(user_id = %user_id, "Presence unregistered");
        }

        info!("Connection closed");

        Ok(())
    }
}
