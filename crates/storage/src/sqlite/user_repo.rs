use chrono::{DateTime, Utc};
use mentor_core::model::{Registration, User, UserId};

use super::SqliteRepository;
use super::mapping::{db, id_i64, map_user_row, user_id_from_i64};
use crate::repository::{StorageError, UserRepository};

const USER_COLUMNS: &str = "id, username, email, first_name, last_name, created_at";

#[async_trait::async_trait]
impl UserRepository for SqliteRepository {
    async fn create_user(
        &self,
        registration: &Registration,
        username: &str,
        created_at: DateTime<Utc>,
    ) -> Result<User, StorageError> {
        let mut tx = self.pool.begin().await.map_err(db)?;

        let res = sqlx::query(
            r"
            INSERT INTO users (username, email, first_name, last_name, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ",
        )
        .bind(username)
        .bind(registration.email())
        .bind(registration.first_name())
        .bind(registration.last_name())
        .bind(created_at)
        .execute(&mut *tx)
        .await
        .map_err(db)?;
        let id = user_id_from_i64(res.last_insert_rowid())?;

        sqlx::query(
            r"
            INSERT INTO profiles (user_id, is_mentor, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?3)
            ",
        )
        .bind(id_i64("user_id", id.value())?)
        .bind(i64::from(registration.is_mentor()))
        .bind(created_at)
        .execute(&mut *tx)
        .await
        .map_err(db)?;

        tx.commit().await.map_err(db)?;

        Ok(User::from_persisted(
            id,
            username.to_owned(),
            registration.email().to_owned(),
            registration.first_name().to_owned(),
            registration.last_name().to_owned(),
            created_at,
        ))
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, StorageError> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"))
            .bind(id_i64("user_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?;
        row.as_ref().map(map_user_row).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = ?1 COLLATE NOCASE"
        ))
        .bind(email.trim())
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?;
        row.as_ref().map(map_user_row).transpose()
    }

    async fn username_taken(&self, username: &str) -> Result<bool, StorageError> {
        let row = sqlx::query("SELECT 1 FROM users WHERE username = ?1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?;
        Ok(row.is_some())
    }

    async fn list_users(&self) -> Result<Vec<User>, StorageError> {
        let rows = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id ASC"))
            .fetch_all(&self.pool)
            .await
            .map_err(db)?;
        rows.iter().map(map_user_row).collect()
    }
}
