//! `FileDef` repository backing the media HTTP surface (spec.md §6):
//! `POST /file/u` records an upload, `GET /file/s/…` looks one up to stream.

use super::DbError;
use sqlx::SqlitePool;
use wire_proto::Uid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Pending,
    Ready,
}

impl FileStatus {
    fn as_str(self) -> &'static str {
        match self {
            FileStatus::Pending => "pending",
            FileStatus::Ready => "ready",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "ready" => FileStatus::Ready,
            _ => FileStatus::Pending,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileDef {
    pub id: i64,
    pub uid: Uid,
    pub mime_type: String,
    pub size: u64,
    pub location: String,
    pub status: FileStatus,
}

pub struct FileRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> FileRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, uid: Uid, mime_type: &str, size: u64, location: &str) -> Result<FileDef, DbError> {
        let now = chrono::Utc::now().timestamp();
        let id = sqlx::query("INSERT INTO files (uid, mime_type, size, location, status, created_at) VALUES (?, ?, ?, ?, 'ready', ?)")
            .bind(uid.0 as i64)
            .bind(mime_type)
            .bind(size as i64)
            .bind(location)
            .bind(now)
            .execute(self.pool)
            .await?
            .last_insert_rowid();
        Ok(FileDef { id, uid, mime_type: mime_type.to_string(), size, location: location.to_string(), status: FileStatus::Ready })
    }

    pub async fn get(&self, id: i64) -> Result<Option<FileDef>, DbError> {
        let row: Option<(i64, String, i64, String, String)> =
            sqlx::query_as("SELECT uid, mime_type, size, location, status FROM files WHERE id = ?").bind(id).fetch_optional(self.pool).await?;
        Ok(row.map(|(uid, mime_type, size, location, status)| FileDef {
            id,
            uid: Uid(uid as u64),
            mime_type,
            size: size as u64,
            location,
            status: FileStatus::from_str(&status),
        }))
    }
}
