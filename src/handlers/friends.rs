//! Friend request and acceptance handlers.

use super::Context;
use crate::error::{EventError, EventResult};
use crate::events::ServerEvent;

/// `friend_request`: create (or find) the pending request, notify the
/// recipient, acknowledge the sender.
pub async fn friend_request(ctx: &Context<'_>, from: &str, to: &str) -> EventResult {
    if from == to {
        return Err(EventError::InvalidArgument(
            "cannot send a friend request to yourself".to_string(),
        ));
    }

    let users = ctx.db.users();
    let sender = users
        .find_by_id(from)
        .await?
        .ok_or_else(|| EventError::NotFound(format!("user {from}")))?;
    users
        .find_by_id(to)
        .await?
        .ok_or_else(|| EventError::NotFound(format!("user {to}")))?;

    let (request, created) = ctx.db.requests().create(from, to).await?;

    // Recipient notification is best-effort; the sender ack is direct and
    // completes regardless of the recipient's reachability.
    ctx.router.deliver(
        to,
        ServerEvent::NewFriendRequest {
            request_id: request.id.clone(),
            from: sender.summary(),
            message: "New friend request received".to_string(),
        },
    );

    let message = if created {
        "Request sent successfully!"
    } else {
        "Request already pending"
    };
    ctx.sender
        .send(ServerEvent::RequestSent {
            request_id: request.id,
            message: message.to_string(),
        })
        .await?;

    Ok(())
}

/// `accept_request`: apply the mutual friendship transactionally, then
/// notify both parties.
pub async fn accept_request(ctx: &Context<'_>, request_id: &str) -> EventResult {
    let request = ctx
        .db
        .requests()
        .accept(request_id)
        .await?
        .ok_or_else(|| EventError::NotFound(format!("friend request {request_id}")))?;

    let users = ctx.db.users();
    let sender = users
        .find_by_id(&request.sender_id)
        .await?
        .ok_or_else(|| EventError::NotFound(format!("user {}", request.sender_id)))?;
    let recipient = users
        .find_by_id(&request.recipient_id)
        .await?
        .ok_or_else(|| EventError::NotFound(format!("user {}", request.recipient_id)))?;

    ctx.router.deliver_both(
        (
            request.sender_id.as_str(),
            ServerEvent::RequestAccepted {
                friend: recipient.summary(),
                message: "Friend request accepted".to_string(),
            },
        ),
        (
            request.recipient_id.as_str(),
            ServerEvent::RequestAccepted {
                friend: sender.summary(),
                message: "Friend request accepted".to_string(),
            },
        ),
    );

    Ok(())
}
