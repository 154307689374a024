//! Friend request repository.
//!
//! A request lives in exactly one persisted state: pending. Acceptance
//! applies the mutual friendship and deletes the record in one transaction,
//! so a request id can never be accepted twice and the friends relation can
//! never be half-applied.

use super::{DbError, sorted_pair};
use crate::events::UserSummary;
use sqlx::SqlitePool;
use uuid::Uuid;

/// A pending friend request.
#[derive(Debug, Clone)]
pub struct FriendRequest {
    pub id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub created_at: i64,
}

type RequestRow = (String, String, String, i64);

fn row_to_request(row: RequestRow) -> FriendRequest {
    let (id, sender_id, recipient_id, created_at) = row;
    FriendRequest {
        id,
        sender_id,
        recipient_id,
        created_at,
    }
}

/// Repository for friend request operations.
pub struct FriendRequestRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> FriendRequestRepository<'a> {
    /// Create a new friend request repository.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a pending request from `sender` to `recipient`, or return the
    /// existing pending request for the unordered pair.
    ///
    /// Returns the request and whether it was newly created. A race between
    /// two concurrent creations is settled by the UNIQUE(pair_lo, pair_hi)
    /// index; the loser re-reads and returns the winner's row.
    pub async fn create(
        &self,
        sender_id: &str,
        recipient_id: &str,
    ) -> Result<(FriendRequest, bool), DbError> {
        if sender_id == recipient_id {
            return Err(DbError::SameParticipants);
        }

        let (lo, hi) = sorted_pair(sender_id, recipient_id);

        if let Some(existing) = self.find_by_pair(lo, hi).await? {
            return Ok((existing, false));
        }

        let id = Uuid::new_v4().to_string();
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO friend_requests (id, sender_id, recipient_id, pair_lo, pair_hi, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(sender_id)
        .bind(recipient_id)
        .bind(lo)
        .bind(hi)
        .bind(now)
        .execute(self.pool)
        .await;

        match result {
            Ok(_) => Ok((
                FriendRequest {
                    id,
                    sender_id: sender_id.to_string(),
                    recipient_id: recipient_id.to_string(),
                    created_at: now,
                },
                true,
            )),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                // Lost the creation race; the winner's row is authoritative
                let existing = self.find_by_pair(lo, hi).await?.ok_or_else(|| {
                    DbError::Internal("request vanished after unique violation".to_string())
                })?;
                Ok((existing, false))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Find the pending request for a sorted pair, either direction.
    async fn find_by_pair(&self, lo: &str, hi: &str) -> Result<Option<FriendRequest>, DbError> {
        let row = sqlx::query_as::<_, RequestRow>(
            r#"
            SELECT id, sender_id, recipient_id, created_at
            FROM friend_requests
            WHERE pair_lo = ? AND pair_hi = ?
            "#,
        )
        .bind(lo)
        .bind(hi)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(row_to_request))
    }

    /// Find a request by id.
    pub async fn get(&self, id: &str) -> Result<Option<FriendRequest>, DbError> {
        let row = sqlx::query_as::<_, RequestRow>(
            r#"
            SELECT id, sender_id, recipient_id, created_at
            FROM friend_requests
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(row_to_request))
    }

    /// Pending requests addressed to `recipient_id`, sender profiles resolved.
    pub async fn pending_for(
        &self,
        recipient_id: &str,
    ) -> Result<Vec<(FriendRequest, UserSummary)>, DbError> {
        let rows = sqlx::query_as::<_, (String, String, String, i64, String, String)>(
            r#"
            SELECT r.id, r.sender_id, r.recipient_id, r.created_at,
                   u.first_name, u.last_name
            FROM friend_requests r
            JOIN users u ON u.id = r.sender_id
            WHERE r.recipient_id = ?
            ORDER BY r.created_at
            "#,
        )
        .bind(recipient_id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, sender_id, recipient_id, created_at, first_name, last_name)| {
                let sender = UserSummary {
                    id: sender_id.clone(),
                    first_name,
                    last_name,
                };
                (
                    FriendRequest {
                        id,
                        sender_id,
                        recipient_id,
                        created_at,
                    },
                    sender,
                )
            })
            .collect())
    }

    /// Accept a request: apply the mutual friendship and delete the record.
    ///
    /// Both directed friendship rows and the deletion commit in one
    /// transaction. Returns the consumed request, or `None` when the id does
    /// not exist (including a second accept of an already-consumed id; the
    /// friendship is never re-applied).
    pub async fn accept(&self, request_id: &str) -> Result<Option<FriendRequest>, DbError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, RequestRow>(
            r#"
            SELECT id, sender_id, recipient_id, created_at
            FROM friend_requests
            WHERE id = ?
            "#,
        )
        .bind(request_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let request = row_to_request(row);
        let now = chrono::Utc::now().timestamp();

        // OR IGNORE tolerates a friendship that already exists
        sqlx::query(
            "INSERT OR IGNORE INTO friends (user_id, friend_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(&request.sender_id)
        .bind(&request.recipient_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT OR IGNORE INTO friends (user_id, friend_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(&request.recipient_id)
        .bind(&request.sender_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM friend_requests WHERE id = ?")
            .bind(&request.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(Some(request))
    }
}
