//! `Message(topic,seq)` and `DelMessage(topic,delid)` repositories.

use super::DbError;
use sqlx::SqlitePool;
use wire_proto::Uid;

#[derive(Debug, Clone)]
pub struct MessageRecord {
    pub topic: String,
    pub seq: i64,
    pub from: Uid,
    pub head: serde_json::Value,
    pub content: serde_json::Value,
    pub deleted: bool,
    pub created_at: i64,
}

pub struct MessageRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> MessageRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Persist a `{pub}`-originated message at the already-assigned `seq`.
    /// The topic actor owns sequence assignment (spec.md §3 invariant 3);
    /// this call never generates a seq of its own.
    pub async fn insert(&self, topic: &str, seq: i64, from: Uid, content: &serde_json::Value) -> Result<(), DbError> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query("INSERT INTO messages (topic, seq, from_uid, head, content, created_at) VALUES (?, ?, ?, '{}', ?, ?)")
            .bind(topic)
            .bind(seq)
            .bind(from.0 as i64)
            .bind(content.to_string())
            .bind(now)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Persist a video-call synthetic "replacement" message (§4.8):
    /// `head.replace`/`head.webrtc` describing a call outcome, written at the
    /// same `seq` the originating `{pub}` used.
    pub async fn insert_replacement(&self, topic: &str, seq: i64, head: &serde_json::Value) -> Result<(), DbError> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            "INSERT INTO messages (topic, seq, from_uid, head, content, created_at) VALUES (?, ?, 0, ?, 'null', ?) \
             ON CONFLICT(topic, seq) DO UPDATE SET head = excluded.head",
        )
        .bind(topic)
        .bind(seq)
        .bind(head.to_string())
        .bind(now)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, topic: &str, seq: i64) -> Result<Option<MessageRecord>, DbError> {
        let row: Option<(i64, String, String, i64, i64)> =
            sqlx::query_as("SELECT from_uid, head, content, deleted_at IS NOT NULL, created_at FROM messages WHERE topic = ? AND seq = ?")
                .bind(topic)
                .bind(seq)
                .fetch_optional(self.pool)
                .await?;
        Ok(row.map(|(from, head, content, deleted, created_at)| MessageRecord {
            topic: topic.to_string(),
            seq,
            from: Uid(from as u64),
            head: serde_json::from_str(&head).unwrap_or(serde_json::Value::Null),
            content: serde_json::from_str(&content).unwrap_or(serde_json::Value::Null),
            deleted: deleted != 0,
            created_at,
        }))
    }

    /// Soft- or hard-delete a list of `{lowId, hiId}` ranges, recording a
    /// `del_messages` transaction and returning the next `delId` assigned.
    pub async fn delete_ranges(&self, topic: &str, ranges: &[(i64, i64)], hard: bool, next_del_id: i64) -> Result<(), DbError> {
        let now = chrono::Utc::now().timestamp();
        for &(low, hi) in ranges {
            if hard {
                sqlx::query("DELETE FROM messages WHERE topic = ? AND seq >= ? AND seq < ?").bind(topic).bind(low).bind(hi).execute(self.pool).await?;
            } else {
                sqlx::query("UPDATE messages SET deleted_at = ? WHERE topic = ? AND seq >= ? AND seq < ?")
                    .bind(now)
                    .bind(topic)
                    .bind(low)
                    .bind(hi)
                    .execute(self.pool)
                    .await?;
            }
            sqlx::query("INSERT INTO del_messages (topic, del_id, low_seq, hi_seq, hard, created_at) VALUES (?, ?, ?, ?, ?, ?)")
                .bind(topic)
                .bind(next_del_id)
                .bind(low)
                .bind(hi)
                .bind(hard)
                .bind(now)
                .execute(self.pool)
                .await?;
        }
        Ok(())
    }

    pub async fn delete_all_for_topic(&self, topic: &str) -> Result<(), DbError> {
        sqlx::query("DELETE FROM messages WHERE topic = ?").bind(topic).execute(self.pool).await?;
        sqlx::query("DELETE FROM del_messages WHERE topic = ?").bind(topic).execute(self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> crate::db::Database {
        crate::db::Database::new(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn insert_and_get_round_trips() {
        let db = test_db().await;
        let content = serde_json::json!("hello");
        db.messages().insert("grpAAA", 1, Uid(7), &content).await.unwrap();
        let got = db.messages().get("grpAAA", 1).await.unwrap().unwrap();
        assert_eq!(got.from, Uid(7));
        assert_eq!(got.content, content);
        assert!(!got.deleted);
    }

    #[tokio::test]
    async fn soft_delete_range_marks_deleted() {
        let db = test_db().await;
        for seq in 1..=3 {
            db.messages().insert("grpAAA", seq, Uid(1), &serde_json::json!("x")).await.unwrap();
        }
        db.messages().delete_ranges("grpAAA", &[(1, 3)], false, 1).await.unwrap();
        let got = db.messages().get("grpAAA", 1).await.unwrap().unwrap();
        assert!(got.deleted);
    }
}
