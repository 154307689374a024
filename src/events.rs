//! Real-time event protocol.
//!
//! Events are JSON objects tagged by an `"event"` field, exchanged as text
//! frames over the WebSocket. `ClientEvent` is the inbound surface,
//! `ServerEvent` the outbound one.

use serde::{Deserialize, Serialize};

/// A file attached to a `file_message` event. Bytes travel base64-encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileDescriptor {
    /// Original filename as supplied by the client.
    pub name: String,
    /// File bytes, base64-encoded.
    pub content: String,
}

/// Events received from clients.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClientEvent {
    FriendRequest {
        from: String,
        to: String,
    },
    AcceptRequest {
        request_id: String,
    },
    GetDirectConversations {
        user_id: String,
    },
    StartConversation {
        from: String,
        to: String,
    },
    TextMessage {
        from: String,
        to: String,
        text: String,
    },
    FileMessage {
        from: String,
        to: String,
        file: FileDescriptor,
    },
    End {
        user_id: String,
    },
}

impl ClientEvent {
    /// Event name for logging and metrics labeling.
    pub fn name(&self) -> &'static str {
        match self {
            Self::FriendRequest { .. } => "friend_request",
            Self::AcceptRequest { .. } => "accept_request",
            Self::GetDirectConversations { .. } => "get_direct_conversations",
            Self::StartConversation { .. } => "start_conversation",
            Self::TextMessage { .. } => "text_message",
            Self::FileMessage { .. } => "file_message",
            Self::End { .. } => "end",
        }
    }
}

/// Profile summary resolved onto notifications and conversation participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
}

/// Message kind discriminant, shared with the persistence layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    File,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::File => "file",
        }
    }
}

/// Stored file reference carried by file messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileReference {
    /// Original filename.
    pub name: String,
    /// Extension, without the dot. Empty when the original name had none.
    pub ext: String,
    /// Stable key returned by the object-storage collaborator.
    pub storage_key: String,
}

/// A persisted message as exposed to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagePayload {
    pub id: String,
    pub sender_id: String,
    pub kind: MessageKind,
    /// Text body; present for text messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// File reference; present for file messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<FileReference>,
    /// Unix timestamp, seconds.
    pub created_at: i64,
}

/// A direct conversation with its participants resolved and messages in
/// append order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationPayload {
    pub id: String,
    pub participants: Vec<UserSummary>,
    pub messages: Vec<MessagePayload>,
    pub created_at: i64,
}

/// Events emitted to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServerEvent {
    /// A friend request arrived for this user.
    NewFriendRequest {
        request_id: String,
        from: UserSummary,
        message: String,
    },
    /// Acknowledgment to the sender of a friend request.
    RequestSent {
        request_id: String,
        message: String,
    },
    /// A friend request was accepted; sent to both parties.
    RequestAccepted {
        friend: UserSummary,
        message: String,
    },
    /// All direct conversations for the requesting user.
    DirectConversations {
        conversations: Vec<ConversationPayload>,
    },
    /// A new conversation was created for the caller.
    StartChat {
        conversation: ConversationPayload,
    },
    /// The existing conversation between the pair.
    OpenChat {
        conversation: ConversationPayload,
    },
    /// A message addressed to this user.
    IncomingMessage {
        conversation_id: String,
        message: MessagePayload,
    },
    /// Delivery acknowledgment carrying the sender's persisted copy.
    OutgoingMessage {
        conversation_id: String,
        message: MessagePayload,
    },
    /// An event failed; `code` matches `EventError::error_code`.
    Error {
        #[serde(rename = "source_event")]
        event: String,
        code: String,
        message: String,
    },
}

impl ServerEvent {
    /// Event name for logging and metrics labeling.
    pub fn name(&self) -> &'static str {
        match self {
            Self::NewFriendRequest { .. } => "new_friend_request",
            Self::RequestSent { .. } => "request_sent",
            Self::RequestAccepted { .. } => "request_accepted",
            Self::DirectConversations { .. } => "direct_conversations",
            Self::StartChat { .. } => "start_chat",
            Self::OpenChat { .. } => "open_chat",
            Self::IncomingMessage { .. } => "incoming_message",
            Self::OutgoingMessage { .. } => "outgoing_message",
            Self::Error { .. } => "error",
        }
    }
}
