//! `Subscription(user,topic)` repository. Invariant 4 in spec.md §8: at
//! most one live row per `(uid, topic)` pair — enforced here by the primary
//! key plus a `deleted_at` soft-delete column rather than a hard delete, so
//! `{get sub}` can still report "was here, left" history if ever needed.

use super::DbError;
use sqlx::SqlitePool;
use wire_proto::{AccessMode, Uid};

#[derive(Debug, Clone)]
pub struct SubRow {
    pub uid: Uid,
    pub topic: String,
    pub mode_want: AccessMode,
    pub mode_given: AccessMode,
    pub public: Option<serde_json::Value>,
    pub private: Option<serde_json::Value>,
    pub read_id: i64,
    pub recv_id: i64,
    pub clear_id: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

pub struct SubRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> SubRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a fresh subscription row, or revive a previously soft-deleted
    /// one with default counters — matching spec.md §8 property 5 ("a fresh
    /// `{sub X}` creates a new row with defaults").
    pub async fn upsert(&self, uid: Uid, topic: &str, mode_want: AccessMode, mode_given: AccessMode) -> Result<SubRow, DbError> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO subscriptions (uid, topic, mode_want, mode_given, created_at, updated_at, deleted_at)
            VALUES (?, ?, ?, ?, ?, ?, NULL)
            ON CONFLICT(uid, topic) DO UPDATE SET
                mode_want = excluded.mode_want,
                mode_given = excluded.mode_given,
                read_id = 0, recv_id = 0, clear_id = 0,
                updated_at = excluded.updated_at,
                deleted_at = NULL
            "#,
        )
        .bind(uid.0 as i64)
        .bind(topic)
        .bind(mode_want.0 as i64)
        .bind(mode_given.0 as i64)
        .bind(now)
        .bind(now)
        .execute(self.pool)
        .await?;

        Ok(SubRow {
            uid,
            topic: topic.to_string(),
            mode_want,
            mode_given,
            public: None,
            private: None,
            read_id: 0,
            recv_id: 0,
            clear_id: 0,
            created_at: now,
            updated_at: now,
        })
    }

    pub async fn get(&self, uid: Uid, topic: &str) -> Result<Option<SubRow>, DbError> {
        let row: Option<(i64, i64, Option<String>, Option<String>, i64, i64, i64, i64, i64)> = sqlx::query_as(
            "SELECT mode_want, mode_given, public, private, read_id, recv_id, clear_id, created_at, updated_at \
             FROM subscriptions WHERE uid = ? AND topic = ? AND deleted_at IS NULL",
        )
        .bind(uid.0 as i64)
        .bind(topic)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(|(want, given, public, private, read_id, recv_id, clear_id, created_at, updated_at)| SubRow {
            uid,
            topic: topic.to_string(),
            mode_want: AccessMode(want as u8),
            mode_given: AccessMode(given as u8),
            public: public.and_then(|p| serde_json::from_str(&p).ok()),
            private: private.and_then(|p| serde_json::from_str(&p).ok()),
            read_id,
            recv_id,
            clear_id,
            created_at,
            updated_at,
        }))
    }

    pub async fn list_for_topic(&self, topic: &str) -> Result<Vec<SubRow>, DbError> {
        let rows: Vec<(i64, i64, i64, Option<String>, Option<String>, i64, i64, i64, i64, i64)> = sqlx::query_as(
            "SELECT uid, mode_want, mode_given, public, private, read_id, recv_id, clear_id, created_at, updated_at \
             FROM subscriptions WHERE topic = ? AND deleted_at IS NULL",
        )
        .bind(topic)
        .fetch_all(self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(uid, want, given, public, private, read_id, recv_id, clear_id, created_at, updated_at)| SubRow {
                uid: Uid(uid as u64),
                topic: topic.to_string(),
                mode_want: AccessMode(want as u8),
                mode_given: AccessMode(given as u8),
                public: public.and_then(|p| serde_json::from_str(&p).ok()),
                private: private.and_then(|p| serde_json::from_str(&p).ok()),
                read_id,
                recv_id,
                clear_id,
                created_at,
                updated_at,
            })
            .collect())
    }

    pub async fn update_receipt(&self, uid: Uid, topic: &str, read_id: Option<i64>, recv_id: Option<i64>) -> Result<(), DbError> {
        let now = chrono::Utc::now().timestamp();
        if let Some(r) = read_id {
            sqlx::query("UPDATE subscriptions SET read_id = ?, updated_at = ? WHERE uid = ? AND topic = ?")
                .bind(r)
                .bind(now)
                .bind(uid.0 as i64)
                .bind(topic)
                .execute(self.pool)
                .await?;
        }
        if let Some(r) = recv_id {
            sqlx::query("UPDATE subscriptions SET recv_id = ?, updated_at = ? WHERE uid = ? AND topic = ?")
                .bind(r)
                .bind(now)
                .bind(uid.0 as i64)
                .bind(topic)
                .execute(self.pool)
                .await?;
        }
        Ok(())
    }

    /// `{leave unsub=true}` / `{del what=sub}`: soft-delete the row so a
    /// fresh subscribe starts from defaults (property 5).
    pub async fn delete(&self, uid: Uid, topic: &str) -> Result<(), DbError> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query("UPDATE subscriptions SET deleted_at = ? WHERE uid = ? AND topic = ?")
            .bind(now)
            .bind(uid.0 as i64)
            .bind(topic)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete_all_for_topic(&self, topic: &str) -> Result<(), DbError> {
        sqlx::query("DELETE FROM subscriptions WHERE topic = ?").bind(topic).execute(self.pool).await?;
        Ok(())
    }
}
