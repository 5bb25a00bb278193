//! `DeviceDef` repository: per-(user,device) push tokens, read by the push
//! fanout path (§4.9) and written by clients on `{login}`/`{hi}`.

use super::DbError;
use sqlx::SqlitePool;
use wire_proto::Uid;

#[derive(Debug, Clone)]
pub struct Device {
    pub uid: Uid,
    pub device_id: String,
    pub platform: String,
    pub push_token: String,
    pub lang: Option<String>,
}

pub struct DeviceRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> DeviceRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn upsert(&self, uid: Uid, device_id: &str, platform: &str, push_token: &str, lang: Option<&str>) -> Result<(), DbError> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            "INSERT INTO devices (uid, device_id, platform, push_token, lang, updated_at) VALUES (?, ?, ?, ?, ?, ?) \
             ON CONFLICT(uid, device_id) DO UPDATE SET platform = excluded.platform, push_token = excluded.push_token, \
             lang = excluded.lang, updated_at = excluded.updated_at",
        )
        .bind(uid.0 as i64)
        .bind(device_id)
        .bind(platform)
        .bind(push_token)
        .bind(lang)
        .bind(now)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_for_user(&self, uid: Uid) -> Result<Vec<Device>, DbError> {
        let rows: Vec<(String, String, String, Option<String>)> =
            sqlx::query_as("SELECT device_id, platform, push_token, lang FROM devices WHERE uid = ?").bind(uid.0 as i64).fetch_all(self.pool).await?;
        Ok(rows.into_iter().map(|(device_id, platform, push_token, lang)| Device { uid, device_id, platform, push_token, lang }).collect())
    }

    pub async fn delete(&self, uid: Uid, device_id: &str) -> Result<(), DbError> {
        sqlx::query("DELETE FROM devices WHERE uid = ? AND device_id = ?").bind(uid.0 as i64).bind(device_id).execute(self.pool).await?;
        Ok(())
    }
}
