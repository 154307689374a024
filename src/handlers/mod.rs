//! Client event handlers.
//!
//! Each inbound event is dispatched to a handler that performs its
//! persistence operation first, then routes results: direct acknowledgments
//! go back through the connection's own sender, counterpart notifications go
//! through the best-effort Event Router.

mod conversations;
mod friends;
mod messaging;

use crate::db::{Database, Presence};
use crate::dispatch::MessageDispatcher;
use crate::error::{EventError, EventResult};
use crate::events::{ClientEvent, ServerEvent};
use crate::router::EventRouter;
use crate::state::ConnectionRegistry;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

/// Handler context passed to each event handler.
pub struct Context<'a> {
    /// User id bound at the WebSocket handshake, if the client supplied one.
    pub user_id: Option<&'a str>,
    /// Shared connection registry.
    pub registry: &'a Arc<ConnectionRegistry>,
    /// Persistence.
    pub db: &'a Database,
    /// Best-effort router for counterpart notifications.
    pub router: &'a EventRouter,
    /// Message dispatcher for text/file messages.
    pub dispatcher: &'a MessageDispatcher,
    /// Direct acknowledgment channel to this connection.
    pub sender: &'a mpsc::Sender<ServerEvent>,
}

/// Dispatch an event to its handler.
async fn dispatch(ctx: &Context<'_>, event: ClientEvent) -> EventResult {
    match event {
        ClientEvent::FriendRequest { from, to } => {
            friends::friend_request(ctx, &from, &to).await
        }
        ClientEvent::AcceptRequest { request_id } => {
            friends::accept_request(ctx, &request_id).await
        }
        ClientEvent::GetDirectConversations { user_id } => {
            conversations::get_direct_conversations(ctx, &user_id).await
        }
        ClientEvent::StartConversation { from, to } => {
            conversations::start_conversation(ctx, &from, &to).await
        }
        ClientEvent::TextMessage { from, to, text } => {
            messaging::text_message(ctx, &from, &to, text).await
        }
        ClientEvent::FileMessage { from, to, file } => {
            messaging::file_message(ctx, &from, &to, file).await
        }
        ClientEvent::End { user_id } => end(ctx, &user_id).await,
    }
}

/// Process one client event, applying the error policy.
///
/// Handler failures are logged, counted, and answered with an `error` event
/// where one is warranted; they never tear down the connection task. The
/// returned `Err` is reserved for loop-breaking conditions: the client asked
/// to end, or its outbound channel is gone.
pub async fn process(ctx: &Context<'_>, event: ClientEvent) -> EventResult {
    let name = event.name();
    crate::metrics::record_event(name);

    match dispatch(ctx, event).await {
        Ok(()) => Ok(()),
        Err(EventError::End) => Err(EventError::End),
        Err(e @ EventError::Send(_)) => {
            crate::metrics::record_event_error(name, e.error_code());
            Err(e)
        }
        Err(e) => {
            crate::metrics::record_event_error(name, e.error_code());
            warn!(event = %name, user_id = ?ctx.user_id, error = %e, "Event handler error");
            if let Some(reply) = e.to_client_reply(name) {
                // Best-effort; a closed channel surfaces on the next event
                let _ = ctx.sender.try_send(reply);
            }
            Ok(())
        }
    }
}

/// The `end` event: unregister and go offline, then close the connection.
async fn end(ctx: &Context<'_>, user_id: &str) -> EventResult {
    ctx.registry.unregister(user_id);
    if let Err(e) = ctx.db.users().set_presence(user_id, Presence::Offline).await {
        warn!(user_id = %user_id, error = %e, "Failed to persist offline presence");
    }
    Err(EventError::End)
}
