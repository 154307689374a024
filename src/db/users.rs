//! User repository.
//!
//! Profile lookup, the symmetric friends relation, and the persisted
//! presence field. Credential material never passes through here; login and
//! OTP verification belong to the auth collaborator.

use super::DbError;
use crate::events::UserSummary;
use sqlx::SqlitePool;
use uuid::Uuid;

/// Persisted presence status. Kept eventually-consistent with the in-memory
/// connection registry, which is the source of truth for reachability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Online,
    Offline,
}

impl Presence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
        }
    }
}

/// A user profile record.
#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub verified: bool,
    pub presence: Presence,
    pub created_at: i64,
}

impl User {
    /// Profile summary as resolved onto notifications and participants.
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
        }
    }
}

type UserRow = (String, String, String, String, bool, String, i64);

fn row_to_user(row: UserRow) -> User {
    let (id, first_name, last_name, email, verified, presence, created_at) = row;
    User {
        id,
        first_name,
        last_name,
        email,
        verified,
        presence: if presence == "online" {
            Presence::Online
        } else {
            Presence::Offline
        },
        created_at,
    }
}

/// Repository for user operations.
pub struct UserRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> UserRepository<'a> {
    /// Create a new user repository.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new user profile. Registration proper (password, OTP) is the
    /// auth collaborator's job; this seeds the profile record it references.
    pub async fn create(
        &self,
        first_name: &str,
        last_name: &str,
        email: &str,
    ) -> Result<User, DbError> {
        let id = Uuid::new_v4().to_string();
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO users (id, first_name, last_name, email, verified, presence, created_at)
            VALUES (?, ?, ?, ?, 0, 'offline', ?)
            "#,
        )
        .bind(&id)
        .bind(first_name)
        .bind(last_name)
        .bind(email)
        .bind(now)
        .execute(self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return DbError::EmailExists(email.to_string());
            }
            DbError::from(e)
        })?;

        Ok(User {
            id,
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            email: email.to_string(),
            verified: false,
            presence: Presence::Offline,
            created_at: now,
        })
    }

    /// Find a user by id.
    pub async fn find_by_id(&self, id: &str) -> Result<Option<User>, DbError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, first_name, last_name, email, verified, presence, created_at
            FROM users
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(row_to_user))
    }

    /// Find a user by email.
    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, DbError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, first_name, last_name, email, verified, presence, created_at
            FROM users
            WHERE email = ? COLLATE NOCASE
            "#,
        )
        .bind(email)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(row_to_user))
    }

    /// Update the persisted presence field. Best-effort from the caller's
    /// perspective; routing never depends on it.
    pub async fn set_presence(&self, id: &str, presence: Presence) -> Result<(), DbError> {
        sqlx::query("UPDATE users SET presence = ? WHERE id = ?")
            .bind(presence.as_str())
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Downgrade every persisted online presence to offline.
    ///
    /// Run at startup: a fresh process has no live connections, so any
    /// lingering online rows are stale shadows of a previous run.
    pub async fn reset_presence(&self) -> Result<u64, DbError> {
        let result = sqlx::query("UPDATE users SET presence = 'offline' WHERE presence = 'online'")
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// List a user's friends as profile summaries.
    pub async fn friends_of(&self, id: &str) -> Result<Vec<UserSummary>, DbError> {
        let rows = sqlx::query_as::<_, (String, String, String)>(
            r#"
            SELECT u.id, u.first_name, u.last_name
            FROM friends f
            JOIN users u ON u.id = f.friend_id
            WHERE f.user_id = ?
            ORDER BY u.first_name, u.last_name
            "#,
        )
        .bind(id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, first_name, last_name)| UserSummary {
                id,
                first_name,
                last_name,
            })
            .collect())
    }

    /// Whether a friendship row exists in the given direction.
    ///
    /// The relation is symmetric by construction, so one direction suffices;
    /// tests check both to catch partial application.
    pub async fn are_friends(&self, user_id: &str, friend_id: &str) -> Result<bool, DbError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM friends WHERE user_id = ? AND friend_id = ?",
        )
        .bind(user_id)
        .bind(friend_id)
        .fetch_one(self.pool)
        .await?;
        Ok(count > 0)
    }
}
