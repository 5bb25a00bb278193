//! `Topic` repository: spec.md §6's persistence contract for topic rows.

use super::DbError;
use sqlx::SqlitePool;
use wire_proto::{AccessMode, Uid};

#[derive(Debug, Clone)]
pub struct TopicRecord {
    pub name: String,
    pub owner: Uid,
    pub access_auth: AccessMode,
    pub access_anon: AccessMode,
    pub public: Option<serde_json::Value>,
    pub private: Option<serde_json::Value>,
    pub last_id: i64,
    pub clear_id: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

pub struct TopicRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> TopicRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, name: &str, owner: Uid, access_auth: AccessMode, access_anon: AccessMode) -> Result<TopicRecord, DbError> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            "INSERT INTO topics (name, owner, access_auth, access_anon, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(name)
        .bind(owner.0 as i64)
        .bind(access_auth.0 as i64)
        .bind(access_anon.0 as i64)
        .bind(now)
        .bind(now)
        .execute(self.pool)
        .await?;
        Ok(TopicRecord {
            name: name.to_string(),
            owner,
            access_auth,
            access_anon,
            public: None,
            private: None,
            last_id: 0,
            clear_id: 0,
            created_at: now,
            updated_at: now,
        })
    }

    pub async fn get(&self, name: &str) -> Result<Option<TopicRecord>, DbError> {
        let row: Option<(i64, i64, i64, Option<String>, Option<String>, i64, i64, i64, i64)> = sqlx::query_as(
            "SELECT owner, access_auth, access_anon, public, private, last_id, clear_id, created_at, updated_at FROM topics WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(|(owner, auth, anon, public, private, last_id, clear_id, created_at, updated_at)| TopicRecord {
            name: name.to_string(),
            owner: Uid(owner as u64),
            access_auth: AccessMode(auth as u8),
            access_anon: AccessMode(anon as u8),
            public: public.and_then(|p| serde_json::from_str(&p).ok()),
            private: private.and_then(|p| serde_json::from_str(&p).ok()),
            last_id,
            clear_id,
            created_at,
            updated_at,
        }))
    }

    /// Persist `lastId`/`clearId` advancement. Called after every `{pub}` and
    /// every `{del what=msg}` transaction (invariant 3 in spec.md §8).
    pub async fn bump_seq(&self, name: &str, last_id: i64, clear_id: i64) -> Result<(), DbError> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query("UPDATE topics SET last_id = ?, clear_id = ?, updated_at = ? WHERE name = ?")
            .bind(last_id)
            .bind(clear_id)
            .bind(now)
            .bind(name)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_desc(&self, name: &str, public: Option<&serde_json::Value>, private: Option<&serde_json::Value>) -> Result<(), DbError> {
        let now = chrono::Utc::now().timestamp();
        if let Some(p) = public {
            sqlx::query("UPDATE topics SET public = ?, updated_at = ? WHERE name = ?").bind(p.to_string()).bind(now).bind(name).execute(self.pool).await?;
        }
        if let Some(p) = private {
            sqlx::query("UPDATE topics SET private = ?, updated_at = ? WHERE name = ?").bind(p.to_string()).bind(now).bind(name).execute(self.pool).await?;
        }
        Ok(())
    }

    /// `{del what=topic}`: remove the topic row. Subscriptions and messages
    /// are cleaned up by the caller (Hub), matching spec.md §4.6's split
    /// between "delete topic" and "delete its dependents".
    pub async fn delete(&self, name: &str) -> Result<(), DbError> {
        sqlx::query("DELETE FROM topics WHERE name = ?").bind(name).execute(self.pool).await?;
        Ok(())
    }

    /// Minimal fields needed for Hub's `replyTopicDescBasic` — answering a
    /// `{get desc}` without materializing the full topic actor.
    pub async fn basic_desc(&self, name: &str) -> Result<Option<(Option<serde_json::Value>, i64, i64)>, DbError> {
        let row: Option<(Option<String>, i64, i64)> =
            sqlx::query_as("SELECT public, created_at, updated_at FROM topics WHERE name = ?").bind(name).fetch_optional(self.pool).await?;
        Ok(row.map(|(public, created, updated)| (public.and_then(|p| serde_json::from_str(&p).ok()), created, updated)))
    }
}
