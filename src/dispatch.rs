//! Message dispatcher: persist outbound messages, then fan out.
//!
//! Every message is appended to its conversation before any delivery is
//! attempted - a routed message is always durable, so a crash between append
//! and fan-out loses only the real-time notification, never the message.

use crate::db::{Database, NewMessage};
use crate::error::EventError;
use crate::events::{FileDescriptor, FileReference, MessagePayload, ServerEvent};
use crate::router::EventRouter;
use crate::storage::FileStore;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::sync::Arc;

/// Dispatches text and file messages into conversations.
#[derive(Clone)]
pub struct MessageDispatcher {
    db: Database,
    router: EventRouter,
    store: Arc<dyn FileStore>,
}

impl MessageDispatcher {
    pub fn new(db: Database, router: EventRouter, store: Arc<dyn FileStore>) -> Self {
        Self { db, router, store }
    }

    /// Persist a text message from `from` to `to` and fan it out.
    pub async fn send_text(
        &self,
        from: &str,
        to: &str,
        body: String,
    ) -> Result<MessagePayload, EventError> {
        let (conversation, _) = self.db.conversations().get_or_create(from, to).await?;
        let message = self
            .db
            .conversations()
            .append_message(&conversation.id, from, NewMessage::Text { body })
            .await?;
        crate::metrics::record_message(message.kind.as_str());

        self.fan_out(from, to, &conversation.id, message.clone());
        Ok(message)
    }

    /// Store a file payload, persist the file message, and fan it out.
    pub async fn send_file(
        &self,
        from: &str,
        to: &str,
        descriptor: FileDescriptor,
    ) -> Result<MessagePayload, EventError> {
        let bytes = BASE64
            .decode(descriptor.content.as_bytes())
            .map_err(|e| EventError::Storage(format!("invalid base64 payload: {e}")))?;

        let ext = extension_of(&descriptor.name);
        let stored_name = stored_file_name(&ext);
        let storage_key = self
            .store
            .store(&stored_name, &bytes)
            .await
            .map_err(|e| EventError::Storage(e.to_string()))?;

        let (conversation, _) = self.db.conversations().get_or_create(from, to).await?;
        let message = self
            .db
            .conversations()
            .append_message(
                &conversation.id,
                from,
                NewMessage::File {
                    reference: FileReference {
                        name: descriptor.name,
                        ext,
                        storage_key,
                    },
                },
            )
            .await?;
        crate::metrics::record_message(message.kind.as_str());

        self.fan_out(from, to, &conversation.id, message.clone());
        Ok(message)
    }

    /// Route the recipient's copy and the sender's acknowledgment copy.
    /// Both are best-effort; the append above is already durable.
    fn fan_out(&self, from: &str, to: &str, conversation_id: &str, message: MessagePayload) {
        self.router.deliver_both(
            (
                to,
                ServerEvent::IncomingMessage {
                    conversation_id: conversation_id.to_string(),
                    message: message.clone(),
                },
            ),
            (
                from,
                ServerEvent::OutgoingMessage {
                    conversation_id: conversation_id.to_string(),
                    message,
                },
            ),
        );
    }
}

/// Extension of an uploaded filename, without the dot. Empty when absent.
fn extension_of(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => ext.to_ascii_lowercase(),
        _ => String::new(),
    }
}

/// Collision-resistant stored filename: millisecond timestamp plus a random
/// suffix, keeping the original extension.
fn stored_file_name(ext: &str) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let suffix: u32 = rand::random();
    if ext.is_empty() {
        format!("{millis}_{suffix:08x}")
    } else {
        format!("{millis}_{suffix:08x}.{ext}")
    }
}
