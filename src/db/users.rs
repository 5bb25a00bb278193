//! `User` repository: spec.md §6's persistence contract for user rows.

use super::DbError;
use sqlx::SqlitePool;
use wire_proto::{AccessMode, Uid};

#[derive(Debug, Clone)]
pub struct UserRecord {
    pub uid: Uid,
    pub access_auth: AccessMode,
    pub access_anon: AccessMode,
    pub public: Option<serde_json::Value>,
    pub private: Option<serde_json::Value>,
    pub tags: Vec<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

pub struct UserRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> UserRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, uid: Uid, access_auth: AccessMode, access_anon: AccessMode) -> Result<UserRecord, DbError> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query("INSERT INTO users (uid, access_auth, access_anon, tags, created_at, updated_at) VALUES (?, ?, ?, '[]', ?, ?)")
            .bind(uid.0 as i64)
            .bind(access_auth.0 as i64)
            .bind(access_anon.0 as i64)
            .bind(now)
            .bind(now)
            .execute(self.pool)
            .await?;
        Ok(UserRecord {
            uid,
            access_auth,
            access_anon,
            public: None,
            private: None,
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }

    pub async fn get(&self, uid: Uid) -> Result<Option<UserRecord>, DbError> {
        let row: Option<(i64, i64, Option<String>, Option<String>, String, i64, i64)> = sqlx::query_as(
            "SELECT access_auth, access_anon, public, private, tags, created_at, updated_at FROM users WHERE uid = ?",
        )
        .bind(uid.0 as i64)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(|(auth, anon, public, private, tags, created_at, updated_at)| UserRecord {
            uid,
            access_auth: AccessMode(auth as u8),
            access_anon: AccessMode(anon as u8),
            public: public.and_then(|p| serde_json::from_str(&p).ok()),
            private: private.and_then(|p| serde_json::from_str(&p).ok()),
            tags: serde_json::from_str(&tags).unwrap_or_default(),
            created_at,
            updated_at,
        }))
    }

    pub async fn set_public(&self, uid: Uid, public: &serde_json::Value) -> Result<(), DbError> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query("UPDATE users SET public = ?, updated_at = ? WHERE uid = ?")
            .bind(public.to_string())
            .bind(now)
            .bind(uid.0 as i64)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_tags(&self, uid: Uid, tags: &[String]) -> Result<(), DbError> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query("UPDATE users SET tags = ?, updated_at = ? WHERE uid = ?")
            .bind(serde_json::to_string(tags).unwrap_or_else(|_| "[]".to_string()))
            .bind(now)
            .bind(uid.0 as i64)
            .execute(self.pool)
            .await?;
        Ok(())
    }
}
