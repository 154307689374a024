//! Integration tests for conversations and message dispatch.

mod common;

use common::TestServer;
use serde_json::json;
use std::time::Duration;
use tawkd::events::{MessageKind, ServerEvent};

#[tokio::test]
async fn start_conversation_then_reopen() {
    let server = TestServer::spawn().await.expect("spawn server");
    let alice = server.seed_user("Alice", "Ashpool", "alice@tawk.test").await;
    let bob = server.seed_user("Bob", "Corto", "bob@tawk.test").await;

    let mut alice_client = server.connect(&alice.id).await.expect("connect alice");

    alice_client
        .send_json(json!({"event": "start_conversation", "from": alice.id, "to": bob.id}))
        .await
        .expect("start");
    let conversation_id = match alice_client.recv().await.expect("start_chat") {
        ServerEvent::StartChat { conversation } => {
            let ids: Vec<_> = conversation.participants.iter().map(|p| p.id.clone()).collect();
            assert!(ids.contains(&alice.id) && ids.contains(&bob.id));
            assert!(conversation.messages.is_empty());
            conversation.id
        }
        other => panic!("expected start_chat, got {other:?}"),
    };

    // Same pair again opens the existing conversation
    alice_client
        .send_json(json!({"event": "start_conversation", "from": alice.id, "to": bob.id}))
        .await
        .expect("reopen");
    match alice_client.recv().await.expect("open_chat") {
        ServerEvent::OpenChat { conversation } => assert_eq!(conversation.id, conversation_id),
        other => panic!("expected open_chat, got {other:?}"),
    }
}

#[tokio::test]
async fn text_message_reaches_both_parties() {
    let server = TestServer::spawn().await.expect("spawn server");
    let alice = server.seed_user("Alice", "Ashpool", "alice@tawk.test").await;
    let bob = server.seed_user("Bob", "Corto", "bob@tawk.test").await;

    let mut alice_client = server.connect(&alice.id).await.expect("connect alice");
    let mut bob_client = server.connect(&bob.id).await.expect("connect bob");

    alice_client
        .send_json(json!({"event": "text_message", "from": alice.id, "to": bob.id, "text": "hi"}))
        .await
        .expect("send text");

    match bob_client.recv().await.expect("incoming") {
        ServerEvent::IncomingMessage { message, .. } => {
            assert_eq!(message.sender_id, alice.id);
            assert_eq!(message.text.as_deref(), Some("hi"));
        }
        other => panic!("expected incoming_message, got {other:?}"),
    }
    match alice_client.recv().await.expect("outgoing ack") {
        ServerEvent::OutgoingMessage { message, .. } => {
            assert_eq!(message.text.as_deref(), Some("hi"));
        }
        other => panic!("expected outgoing_message, got {other:?}"),
    }
}

#[tokio::test]
async fn message_to_offline_recipient_is_durable() {
    let server = TestServer::spawn().await.expect("spawn server");
    let alice = server.seed_user("Alice", "Ashpool", "alice@tawk.test").await;
    let bob = server.seed_user("Bob", "Corto", "bob@tawk.test").await;

    // Bob is offline the whole time
    let mut alice_client = server.connect(&alice.id).await.expect("connect alice");
    alice_client
        .send_json(json!({"event": "text_message", "from": alice.id, "to": bob.id, "text": "hi"}))
        .await
        .expect("send text");

    // No delivery error; Alice still gets her acknowledgment copy
    match alice_client.recv().await.expect("outgoing ack") {
        ServerEvent::OutgoingMessage { message, .. } => {
            assert_eq!(message.text.as_deref(), Some("hi"));
        }
        other => panic!("expected outgoing_message, got {other:?}"),
    }
    alice_client
        .expect_silence(Duration::from_millis(200))
        .await
        .expect("no error event");

    // Bob finds the message once he asks for his conversations
    let mut bob_client = server.connect(&bob.id).await.expect("connect bob");
    bob_client
        .send_json(json!({"event": "get_direct_conversations", "user_id": bob.id}))
        .await
        .expect("list conversations");

    match bob_client.recv().await.expect("conversations") {
        ServerEvent::DirectConversations { conversations } => {
            assert_eq!(conversations.len(), 1);
            let messages = &conversations[0].messages;
            assert_eq!(messages.len(), 1);
            assert_eq!(messages[0].text.as_deref(), Some("hi"));
            assert_eq!(messages[0].sender_id, alice.id);
        }
        other => panic!("expected direct_conversations, got {other:?}"),
    }
}

#[tokio::test]
async fn file_message_carries_stored_reference() {
    let server = TestServer::spawn().await.expect("spawn server");
    let alice = server.seed_user("Alice", "Ashpool", "alice@tawk.test").await;
    let bob = server.seed_user("Bob", "Corto", "bob@tawk.test").await;

    let mut alice_client = server.connect(&alice.id).await.expect("connect alice");
    let mut bob_client = server.connect(&bob.id).await.expect("connect bob");

    // "aGVsbG8=" is base64 for "hello"
    alice_client
        .send_json(json!({
            "event": "file_message",
            "from": alice.id,
            "to": bob.id,
            "file": {"name": "notes.txt", "content": "aGVsbG8="}
        }))
        .await
        .expect("send file");

    match bob_client.recv().await.expect("incoming file") {
        ServerEvent::IncomingMessage { message, .. } => {
            assert_eq!(message.kind, MessageKind::File);
            let reference = message.file.expect("file reference");
            assert_eq!(reference.name, "notes.txt");
            assert_eq!(reference.ext, "txt");
            assert!(reference.storage_key.ends_with(".txt"));
        }
        other => panic!("expected incoming_message, got {other:?}"),
    }
}

#[tokio::test]
async fn conversation_with_self_is_invalid_argument() {
    let server = TestServer::spawn().await.expect("spawn server");
    let alice = server.seed_user("Alice", "Ashpool", "alice@tawk.test").await;

    let mut client = server.connect(&alice.id).await.expect("connect");
    client
        .send_json(json!({"event": "start_conversation", "from": alice.id, "to": alice.id}))
        .await
        .expect("send");

    match client.recv().await.expect("error reply") {
        ServerEvent::Error { event, code, .. } => {
            assert_eq!(event, "start_conversation");
            assert_eq!(code, "invalid_argument");
        }
        other => panic!("expected error, got {other:?}"),
    }
}

#[tokio::test]
async fn conversation_with_unknown_user_is_not_found() {
    let server = TestServer::spawn().await.expect("spawn server");
    let alice = server.seed_user("Alice", "Ashpool", "alice@tawk.test").await;

    let mut client = server.connect(&alice.id).await.expect("connect");
    client
        .send_json(json!({"event": "start_conversation", "from": alice.id, "to": "ghost"}))
        .await
        .expect("send");

    match client.recv().await.expect("error reply") {
        ServerEvent::Error { code, .. } => assert_eq!(code, "not_found"),
        other => panic!("expected error, got {other:?}"),
    }
}
