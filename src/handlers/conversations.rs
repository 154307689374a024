//! Conversation handlers.

use super::Context;
use crate::error::EventResult;
use crate::events::ServerEvent;

/// `start_conversation`: find or create the conversation for the pair and
/// answer the caller with `start_chat` (new) or `open_chat` (existing).
pub async fn start_conversation(ctx: &Context<'_>, from: &str, to: &str) -> EventResult {
    let (conversation, created) = ctx.db.conversations().get_or_create(from, to).await?;

    let event = if created {
        ServerEvent::StartChat { conversation }
    } else {
        ServerEvent::OpenChat { conversation }
    };
    ctx.sender.send(event).await?;

    Ok(())
}

/// `get_direct_conversations`: all conversations containing the user,
/// messages included.
pub async fn get_direct_conversations(ctx: &Context<'_>, user_id: &str) -> EventResult {
    let conversations = ctx.db.conversations().conversations_for(user_id).await?;
    ctx.sender
        .send(ServerEvent::DirectConversations { conversations })
        .await?;

    Ok(())
}
