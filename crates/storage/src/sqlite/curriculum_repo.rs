use chrono::{DateTime, Utc};
use mentor_core::model::{
    SessionCompletion, SessionTemplate, SessionTemplateDraft, TemplateId, UserId,
};
use mentor_core::policy::CompletionStampPolicy;
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{
    db, id_i64, map_completion_row, map_template_row, ser, template_id_from_i64,
};
use crate::repository::{CurriculumRepository, StorageError};

const TEMPLATE_COLUMNS: &str =
    "id, title, content_markdown, mentor_content_markdown, position, created_at";

fn count_from_i64(v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid count: {v}")))
}

#[async_trait::async_trait]
impl CurriculumRepository for SqliteRepository {
    async fn insert_template(
        &self,
        draft: SessionTemplateDraft,
        created_at: DateTime<Utc>,
    ) -> Result<SessionTemplate, StorageError> {
        // Validate with a placeholder id before touching the table.
        let valid = draft.validate(TemplateId::new(0), created_at).map_err(ser)?;

        let res = sqlx::query(
            r"
            INSERT INTO session_templates
                (title, content_markdown, mentor_content_markdown, position, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ",
        )
        .bind(valid.title())
        .bind(valid.content_markdown())
        .bind(valid.mentor_content_markdown())
        .bind(i64::from(valid.order()))
        .bind(created_at)
        .execute(&self.pool)
        .await
        .map_err(db)?;

        SessionTemplate::new(
            template_id_from_i64(res.last_insert_rowid())?,
            valid.title(),
            valid.content_markdown(),
            valid.mentor_content_markdown(),
            valid.order(),
            created_at,
        )
        .map_err(ser)
    }

    async fn get_template(&self, id: TemplateId) -> Result<Option<SessionTemplate>, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {TEMPLATE_COLUMNS} FROM session_templates WHERE id = ?1"
        ))
        .bind(id_i64("template_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?;
        row.as_ref().map(map_template_row).transpose()
    }

    async fn list_templates(&self) -> Result<Vec<SessionTemplate>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {TEMPLATE_COLUMNS} FROM session_templates
             ORDER BY position ASC, created_at DESC, id ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;
        rows.iter().map(map_template_row).collect()
    }

    async fn count_templates(&self) -> Result<u64, StorageError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM session_templates")
            .fetch_one(&self.pool)
            .await
            .map_err(db)?;
        count_from_i64(row.try_get("n").map_err(ser)?)
    }

    async fn get_completion(
        &self,
        user: UserId,
        template: TemplateId,
    ) -> Result<Option<SessionCompletion>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT user_id, template_id, completed, completed_at, notes
            FROM session_completions
            WHERE user_id = ?1 AND template_id = ?2
            ",
        )
        .bind(id_i64("user_id", user.value())?)
        .bind(id_i64("template_id", template.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?;
        row.as_ref().map(map_completion_row).transpose()
    }

    async fn completions_for_user(
        &self,
        user: UserId,
    ) -> Result<Vec<SessionCompletion>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT user_id, template_id, completed, completed_at, notes
            FROM session_completions
            WHERE user_id = ?1
            ORDER BY template_id ASC
            ",
        )
        .bind(id_i64("user_id", user.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;
        rows.iter().map(map_completion_row).collect()
    }

    async fn count_completed(&self, user: UserId) -> Result<u64, StorageError> {
        let row = sqlx::query(
            r"
            SELECT COUNT(*) AS n
            FROM session_completions c
            JOIN session_templates t ON t.id = c.template_id
            WHERE c.user_id = ?1 AND c.completed = 1
            ",
        )
        .bind(id_i64("user_id", user.value())?)
        .fetch_one(&self.pool)
        .await
        .map_err(db)?;
        count_from_i64(row.try_get("n").map_err(ser)?)
    }

    async fn set_completion(
        &self,
        user: UserId,
        template: TemplateId,
        completed: bool,
        now: DateTime<Utc>,
        policy: CompletionStampPolicy,
    ) -> Result<SessionCompletion, StorageError> {
        // Same rules as `SessionCompletion::set_completed`, in one statement so
        // the unique (user_id, template_id) key arbitrates concurrent toggles.
        let preserve_first = matches!(policy, CompletionStampPolicy::PreserveFirst);
        let row = sqlx::query(
            r"
            INSERT INTO session_completions (user_id, template_id, completed, completed_at, notes)
            VALUES (?1, ?2, ?3, ?4, '')
            ON CONFLICT(user_id, template_id) DO UPDATE SET
                completed = excluded.completed,
                completed_at = CASE
                    WHEN excluded.completed = 0 THEN NULL
                    WHEN ?5 = 1
                        AND session_completions.completed = 1
                        AND session_completions.completed_at IS NOT NULL
                        THEN session_completions.completed_at
                    ELSE excluded.completed_at
                END
            RETURNING user_id, template_id, completed, completed_at, notes
            ",
        )
        .bind(id_i64("user_id", user.value())?)
        .bind(id_i64("template_id", template.value())?)
        .bind(i64::from(completed))
        .bind(completed.then_some(now))
        .bind(i64::from(preserve_first))
        .fetch_one(&self.pool)
        .await
        .map_err(db)?;
        map_completion_row(&row)
    }

    async fn save_completions(&self, records: &[SessionCompletion]) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await.map_err(db)?;
        for record in records {
            sqlx::query(
                r"
                INSERT INTO session_completions (user_id, template_id, completed, completed_at, notes)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(user_id, template_id) DO UPDATE SET
                    completed = excluded.completed,
                    completed_at = excluded.completed_at,
                    notes = excluded.notes
                ",
            )
            .bind(id_i64("user_id", record.user_id.value())?)
            .bind(id_i64("template_id", record.template_id.value())?)
            .bind(i64::from(record.completed))
            .bind(record.completed_at)
            .bind(record.notes.as_str())
            .execute(&mut *tx)
            .await
            .map_err(db)?;
        }
        tx.commit().await.map_err(db)?;
        Ok(())
    }
}
