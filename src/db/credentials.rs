//! `Credential(user,method)` repository: email/phone verification records,
//! checked by the `AuthHandler` credential-validation step on `{acc}`/`{login}`.

use super::DbError;
use sqlx::SqlitePool;
use wire_proto::Uid;

#[derive(Debug, Clone)]
pub struct Credential {
    pub uid: Uid,
    pub method: String,
    pub value: String,
    pub done: bool,
}

pub struct CredentialRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> CredentialRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn add(&self, uid: Uid, method: &str, value: &str, secret: Option<&[u8]>) -> Result<(), DbError> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query("INSERT OR REPLACE INTO credentials (uid, method, value, secret, done, created_at) VALUES (?, ?, ?, ?, 0, ?)")
            .bind(uid.0 as i64)
            .bind(method)
            .bind(value)
            .bind(secret)
            .bind(now)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    pub async fn confirm(&self, uid: Uid, method: &str, value: &str) -> Result<(), DbError> {
        sqlx::query("UPDATE credentials SET done = 1 WHERE uid = ? AND method = ? AND value = ?")
            .bind(uid.0 as i64)
            .bind(method)
            .bind(value)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    pub async fn list_for_user(&self, uid: Uid) -> Result<Vec<Credential>, DbError> {
        let rows: Vec<(String, String, i64)> = sqlx::query_as("SELECT method, value, done FROM credentials WHERE uid = ?")
            .bind(uid.0 as i64)
            .fetch_all(self.pool)
            .await?;
        Ok(rows.into_iter().map(|(method, value, done)| Credential { uid, method, value, done: done != 0 }).collect())
    }

    /// Whether `value` (e.g. an email address) is already claimed by some
    /// other user — the `IsUnique` operation an `AuthHandler` needs.
    pub async fn is_unique(&self, method: &str, value: &str) -> Result<bool, DbError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM credentials WHERE method = ? AND value = ? AND done = 1")
            .bind(method)
            .bind(value)
            .fetch_one(self.pool)
            .await?;
        Ok(count == 0)
    }

    /// Look a credential up by its confirmed `(method, value)` pair and
    /// return its owner plus stored secret — the `basic` scheme reuses this
    /// column for a password hash rather than a verification code.
    pub async fn find_secret(&self, method: &str, value: &str) -> Result<Option<(Uid, Vec<u8>)>, DbError> {
        let row: Option<(i64, Option<Vec<u8>>)> =
            sqlx::query_as("SELECT uid, secret FROM credentials WHERE method = ? AND value = ? AND done = 1")
                .bind(method)
                .bind(value)
                .fetch_optional(self.pool)
                .await?;
        Ok(row.and_then(|(uid, secret)| secret.map(|s| (Uid(uid as u64), s))))
    }
}
