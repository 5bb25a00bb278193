//! Persistence adapter: CRUD on users/topics/subs/messages/files, behind a
//! `Database` handle plus one repository per stable entity from spec.md §6.
//!
//! The concrete schema is not mandated by spec.md; this follows the
//! teacher's `db/mod.rs` shape (`SqlitePool` + `sqlx`, one repository struct
//! per table family, an embedded-migration runner gated on table
//! existence so re-running it is a no-op).

mod credentials;
mod devices;
mod files;
mod messages;
mod subs;
mod topics;
mod users;

pub use credentials::{Credential, CredentialRepository};
pub use devices::{Device, DeviceRepository};
pub use files::{FileDef, FileRepository, FileStatus};
pub use messages::{MessageRecord, MessageRepository};
pub use subs::{SubRepository, SubRow};
pub use topics::{TopicRecord, TopicRepository};
pub use users::{UserRecord, UserRepository};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("not found")]
    NotFound,
    #[error("already exists")]
    AlreadyExists,
}

/// Database handle with connection pool. Cheap to clone: every clone shares
/// the same pool, matching the teacher's `Database`.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);
    const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

    pub async fn new(path: &str) -> Result<Self, DbError> {
        let options = if path == ":memory:" {
            SqliteConnectOptions::new().filename("file::memory:").shared_cache(true).create_if_missing(true)
        } else {
            if let Some(parent) = Path::new(path).parent()
                && !parent.as_os_str().is_empty()
                && let Err(e) = std::fs::create_dir_all(parent)
            {
                tracing::warn!(path = %parent.display(), error = %e, "failed to create database directory");
            }
            SqliteConnectOptions::new().filename(path).create_if_missing(true)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Self::ACQUIRE_TIMEOUT)
            .idle_timeout(Some(Self::IDLE_TIMEOUT))
            .test_before_acquire(true)
            .connect_with(options)
            .await?;

        info!(path = %path, "database connected");
        Self::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn run_migrations(pool: &SqlitePool) -> Result<(), DbError> {
        async fn table_exists(pool: &SqlitePool, table: &str) -> bool {
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name=?)")
                .bind(table)
                .fetch_one(pool)
                .await
                .unwrap_or(false)
        }

        if !table_exists(pool, "users").await {
            Self::run_migration_file(pool, include_str!("../../migrations/001_init.sql")).await;
            info!("database migrations applied (001_init)");
        }
        Ok(())
    }

    async fn run_migration_file(pool: &SqlitePool, migration: &str) {
        for statement in migration.split(';') {
            let sql: String = statement
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with("--"))
                .collect::<Vec<_>>()
                .join("\n");
            if sql.is_empty() {
                continue;
            }
            if let Err(e) = sqlx::query(&sql).execute(pool).await {
                let err_str = e.to_string();
                if !err_str.contains("already exists") {
                    tracing::warn!(sql = %sql, error = %e, "migration statement failed");
                }
            }
        }
    }

    pub fn users(&self) -> UserRepository<'_> {
        UserRepository::new(&self.pool)
    }

    pub fn topics(&self) -> TopicRepository<'_> {
        TopicRepository::new(&self.pool)
    }

    pub fn subs(&self) -> SubRepository<'_> {
        SubRepository::new(&self.pool)
    }

    pub fn messages(&self) -> MessageRepository<'_> {
        MessageRepository::new(&self.pool)
    }

    pub fn credentials(&self) -> CredentialRepository<'_> {
        CredentialRepository::new(&self.pool)
    }

    pub fn files(&self) -> FileRepository<'_> {
        FileRepository::new(&self.pool)
    }

    pub fn devices(&self) -> DeviceRepository<'_> {
        DeviceRepository::new(&self.pool)
    }
}
