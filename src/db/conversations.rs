//! Conversation repository.
//!
//! One direct conversation per unordered user pair, with an append-only
//! message log. The pair is stored sorted so the UNIQUE constraint settles
//! concurrent creation races at the storage layer; the losing writer
//! re-reads and returns the winner's row.

use super::{DbError, sorted_pair};
use crate::events::{ConversationPayload, FileReference, MessageKind, MessagePayload, UserSummary};
use sqlx::SqlitePool;
use uuid::Uuid;

/// A message to append. Payload fields beyond the kind discriminant live
/// with the caller; file bytes have already been handed to the object store.
#[derive(Debug, Clone)]
pub enum NewMessage {
    Text { body: String },
    File { reference: FileReference },
}

type ConversationRow = (String, String, String, i64);
type MessageRow = (
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    i64,
);

fn row_to_message(row: MessageRow) -> MessagePayload {
    let (id, sender_id, kind, body, file_name, file_ext, storage_key, created_at) = row;
    if kind == "file" {
        MessagePayload {
            id,
            sender_id,
            kind: MessageKind::File,
            text: None,
            file: Some(FileReference {
                name: file_name.unwrap_or_default(),
                ext: file_ext.unwrap_or_default(),
                storage_key: storage_key.unwrap_or_default(),
            }),
            created_at,
        }
    } else {
        MessagePayload {
            id,
            sender_id,
            kind: MessageKind::Text,
            text: Some(body.unwrap_or_default()),
            file: None,
            created_at,
        }
    }
}

/// Repository for direct conversation operations.
pub struct ConversationRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ConversationRepository<'a> {
    /// Create a new conversation repository.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Find or create the unique conversation between two distinct users.
    ///
    /// Returns the resolved conversation and whether it was newly created
    /// (drives the `start_chat` vs `open_chat` reply).
    pub async fn get_or_create(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> Result<(ConversationPayload, bool), DbError> {
        if user_a == user_b {
            return Err(DbError::SameParticipants);
        }

        let (lo, hi) = sorted_pair(user_a, user_b);

        if let Some(row) = self.find_by_pair(lo, hi).await? {
            return Ok((self.resolve(row).await?, false));
        }

        let id = Uuid::new_v4().to_string();
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO conversations (id, participant_lo, participant_hi, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(lo)
        .bind(hi)
        .bind(now)
        .execute(self.pool)
        .await;

        match result {
            Ok(_) => {
                let row = self.find_by_pair(lo, hi).await?.ok_or_else(|| {
                    DbError::Internal("conversation vanished after insert".to_string())
                })?;
                Ok((self.resolve(row).await?, true))
            }
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                // Lost the creation race; return the winner's conversation
                let row = self.find_by_pair(lo, hi).await?.ok_or_else(|| {
                    DbError::Internal("conversation vanished after unique violation".to_string())
                })?;
                Ok((self.resolve(row).await?, false))
            }
            Err(sqlx::Error::Database(db_err)) if db_err.is_foreign_key_violation() => {
                Err(DbError::ParticipantMissing)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// All conversations containing `user_id`, messages included.
    pub async fn conversations_for(
        &self,
        user_id: &str,
    ) -> Result<Vec<ConversationPayload>, DbError> {
        let rows = sqlx::query_as::<_, ConversationRow>(
            r#"
            SELECT id, participant_lo, participant_hi, created_at
            FROM conversations
            WHERE participant_lo = ? OR participant_hi = ?
            ORDER BY created_at
            "#,
        )
        .bind(user_id)
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        let mut conversations = Vec::with_capacity(rows.len());
        for row in rows {
            conversations.push(self.resolve(row).await?);
        }
        Ok(conversations)
    }

    /// Append a message to a conversation. The caller routes delivery only
    /// after this returns; durable append strictly precedes fan-out.
    pub async fn append_message(
        &self,
        conversation_id: &str,
        sender_id: &str,
        message: NewMessage,
    ) -> Result<MessagePayload, DbError> {
        let id = Uuid::new_v4().to_string();
        let now = chrono::Utc::now().timestamp();

        let payload = match message {
            NewMessage::Text { body } => {
                sqlx::query(
                    r#"
                    INSERT INTO messages (id, conversation_id, sender_id, kind, body, created_at)
                    VALUES (?, ?, ?, 'text', ?, ?)
                    "#,
                )
                .bind(&id)
                .bind(conversation_id)
                .bind(sender_id)
                .bind(&body)
                .bind(now)
                .execute(self.pool)
                .await?;

                MessagePayload {
                    id,
                    sender_id: sender_id.to_string(),
                    kind: MessageKind::Text,
                    text: Some(body),
                    file: None,
                    created_at: now,
                }
            }
            NewMessage::File { reference } => {
                sqlx::query(
                    r#"
                    INSERT INTO messages
                        (id, conversation_id, sender_id, kind, file_name, file_ext, storage_key, created_at)
                    VALUES (?, ?, ?, 'file', ?, ?, ?, ?)
                    "#,
                )
                .bind(&id)
                .bind(conversation_id)
                .bind(sender_id)
                .bind(&reference.name)
                .bind(&reference.ext)
                .bind(&reference.storage_key)
                .bind(now)
                .execute(self.pool)
                .await?;

                MessagePayload {
                    id,
                    sender_id: sender_id.to_string(),
                    kind: MessageKind::File,
                    text: None,
                    file: Some(reference),
                    created_at: now,
                }
            }
        };

        Ok(payload)
    }

    /// Find a conversation row by sorted pair.
    async fn find_by_pair(&self, lo: &str, hi: &str) -> Result<Option<ConversationRow>, DbError> {
        let row = sqlx::query_as::<_, ConversationRow>(
            r#"
            SELECT id, participant_lo, participant_hi, created_at
            FROM conversations
            WHERE participant_lo = ? AND participant_hi = ?
            "#,
        )
        .bind(lo)
        .bind(hi)
        .fetch_optional(self.pool)
        .await?;
        Ok(row)
    }

    /// Resolve participant profiles and the message log onto a row.
    async fn resolve(&self, row: ConversationRow) -> Result<ConversationPayload, DbError> {
        let (id, lo, hi, created_at) = row;

        let mut participants = Vec::with_capacity(2);
        for participant_id in [&lo, &hi] {
            let profile = sqlx::query_as::<_, (String, String, String)>(
                "SELECT id, first_name, last_name FROM users WHERE id = ?",
            )
            .bind(participant_id)
            .fetch_optional(self.pool)
            .await?;

            if let Some((id, first_name, last_name)) = profile {
                participants.push(UserSummary {
                    id,
                    first_name,
                    last_name,
                });
            }
        }

        let messages = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT id, sender_id, kind, body, file_name, file_ext, storage_key, created_at
            FROM messages
            WHERE conversation_id = ?
            ORDER BY created_at, id
            "#,
        )
        .bind(&id)
        .fetch_all(self.pool)
        .await?;

        Ok(ConversationPayload {
            id,
            participants,
            messages: messages.into_iter().map(row_to_message).collect(),
            created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, User};

    async fn seed_pair(db: &Database) -> (User, User) {
        let users = db.users();
        let alice = users.create("Alice", "Ashpool", "alice@tawk.test").await.unwrap();
        let bob = users.create("Bob", "Corto", "bob@tawk.test").await.unwrap();
        (alice, bob)
    }

    #[tokio::test]
    async fn equal_participants_rejected() {
        let db = Database::new(":memory:").await.unwrap();
        let (alice, _) = seed_pair(&db).await;

        let err = db
            .conversations()
            .get_or_create(&alice.id, &alice.id)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::SameParticipants));
    }

    #[tokio::test]
    async fn one_conversation_per_pair() {
        let db = Database::new(":memory:").await.unwrap();
        let (alice, bob) = seed_pair(&db).await;
        let conversations = db.conversations();

        let (first, created) = conversations.get_or_create(&alice.id, &bob.id).await.unwrap();
        assert!(created);
        assert_eq!(first.participants.len(), 2);

        // Same pair in either argument order resolves to the same record
        let (second, created) = conversations.get_or_create(&bob.id, &alice.id).await.unwrap();
        assert!(!created);
        assert_eq!(second.id, first.id);
    }

    #[tokio::test]
    async fn concurrent_get_or_create_yields_one_row() {
        let db = Database::new(":memory:").await.unwrap();
        let (alice, bob) = seed_pair(&db).await;

        let db_a = db.clone();
        let db_b = db.clone();
        let (a_id, b_id) = (alice.id.clone(), bob.id.clone());
        let (a2, b2) = (alice.id.clone(), bob.id.clone());

        let (left, right) = tokio::join!(
            tokio::spawn(async move { db_a.conversations().get_or_create(&a_id, &b_id).await }),
            tokio::spawn(async move { db_b.conversations().get_or_create(&b2, &a2).await }),
        );
        let (left, _) = left.unwrap().unwrap();
        let (right, _) = right.unwrap().unwrap();
        assert_eq!(left.id, right.id);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM conversations")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn append_preserves_order_and_kind() {
        let db = Database::new(":memory:").await.unwrap();
        let (alice, bob) = seed_pair(&db).await;
        let conversations = db.conversations();

        let (conversation, _) = conversations.get_or_create(&alice.id, &bob.id).await.unwrap();

        conversations
            .append_message(
                &conversation.id,
                &alice.id,
                NewMessage::Text {
                    body: "hi".to_string(),
                },
            )
            .await
            .unwrap();
        conversations
            .append_message(
                &conversation.id,
                &bob.id,
                NewMessage::File {
                    reference: FileReference {
                        name: "photo.png".to_string(),
                        ext: "png".to_string(),
                        storage_key: "1700000000_0000abcd.png".to_string(),
                    },
                },
            )
            .await
            .unwrap();

        let all = conversations.conversations_for(&alice.id).await.unwrap();
        assert_eq!(all.len(), 1);
        let messages = &all[0].messages;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].kind, MessageKind::Text);
        assert_eq!(messages[0].text.as_deref(), Some("hi"));
        assert_eq!(messages[1].kind, MessageKind::File);
        assert_eq!(messages[1].file.as_ref().unwrap().ext, "png");
    }

    #[tokio::test]
    async fn conversations_for_unknown_user_is_empty() {
        let db = Database::new(":memory:").await.unwrap();
        seed_pair(&db).await;

        assert!(db
            .conversations()
            .conversations_for("nobody")
            .await
            .unwrap()
            .is_empty());
    }
}
