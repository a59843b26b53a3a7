use chrono::{DateTime, Utc};
use mentor_core::model::{Message, NewMessage, UserId};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{db, id_i64, map_message_row, message_id_from_i64, ser};
use crate::repository::{MessageRepository, StorageError};

const MESSAGE_COLUMNS: &str = "id, sender_id, recipient_id, body, created_at, is_read, read_at";

#[async_trait::async_trait]
impl MessageRepository for SqliteRepository {
    async fn insert_message(&self, message: NewMessage) -> Result<Message, StorageError> {
        let res = sqlx::query(
            r"
            INSERT INTO messages (sender_id, recipient_id, body, created_at, is_read)
            VALUES (?1, ?2, ?3, ?4, 0)
            ",
        )
        .bind(id_i64("sender_id", message.sender.value())?)
        .bind(id_i64("recipient_id", message.recipient.value())?)
        .bind(message.body.as_str())
        .bind(message.created_at)
        .execute(&self.pool)
        .await
        .map_err(db)?;

        let id = message_id_from_i64(res.last_insert_rowid())?;
        Ok(Message::from_new(id, message))
    }

    async fn thread(&self, a: UserId, b: UserId) -> Result<Vec<Message>, StorageError> {
        let rows = sqlx::query(&format!(
            r"
            SELECT {MESSAGE_COLUMNS}
            FROM messages
            WHERE (sender_id = ?1 AND recipient_id = ?2)
               OR (sender_id = ?2 AND recipient_id = ?1)
            ORDER BY created_at ASC, id ASC
            "
        ))
        .bind(id_i64("user_id", a.value())?)
        .bind(id_i64("user_id", b.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;
        rows.iter().map(map_message_row).collect()
    }

    async fn mark_thread_read(
        &self,
        viewer: UserId,
        other: UserId,
        at: DateTime<Utc>,
    ) -> Result<u64, StorageError> {
        let res = sqlx::query(
            r"
            UPDATE messages
            SET is_read = 1, read_at = ?3
            WHERE recipient_id = ?1 AND sender_id = ?2 AND is_read = 0
            ",
        )
        .bind(id_i64("viewer_id", viewer.value())?)
        .bind(id_i64("other_id", other.value())?)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(res.rows_affected())
    }

    async fn messages_for(&self, user: UserId) -> Result<Vec<Message>, StorageError> {
        let rows = sqlx::query(&format!(
            r"
            SELECT {MESSAGE_COLUMNS}
            FROM messages
            WHERE sender_id = ?1 OR recipient_id = ?1
            ORDER BY created_at DESC, id DESC
            "
        ))
        .bind(id_i64("user_id", user.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;
        rows.iter().map(map_message_row).collect()
    }

    async fn unread_count(&self, user: UserId) -> Result<u64, StorageError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM messages WHERE recipient_id = ?1 AND is_read = 0",
        )
        .bind(id_i64("user_id", user.value())?)
        .fetch_one(&self.pool)
        .await
        .map_err(db)?;
        let n: i64 = row.try_get("n").map_err(ser)?;
        u64::try_from(n).map_err(|_| StorageError::Serialization(format!("invalid count: {n}")))
    }
}
