use chrono::{DateTime, Utc};
use mentor_core::model::{MeetingDefaults, MeetingSlot, Profile, TestKind, TestResult, UserId};

use super::SqliteRepository;
use super::mapping::{db, id_i64, map_profile_row, tool_to_column, url_to_column};
use crate::repository::{ProfileRepository, StorageError};

const PROFILE_COLUMNS: &str = r"
    user_id,
    intro_test_done, intro_test_score, intro_test_taken_at,
    end_test_done, end_test_score, end_test_taken_at,
    assigned_mentor_id, is_mentor,
    next_meeting_at, next_meeting_url, next_meeting_tool, next_meeting_notes,
    default_meeting_url, default_meeting_tool,
    created_at, updated_at
";

fn expect_row(rows_affected: u64) -> Result<(), StorageError> {
    if rows_affected == 0 {
        Err(StorageError::NotFound)
    } else {
        Ok(())
    }
}

#[async_trait::async_trait]
impl ProfileRepository for SqliteRepository {
    async fn get_profile(&self, user: UserId) -> Result<Option<Profile>, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles WHERE user_id = ?1"
        ))
        .bind(id_i64("user_id", user.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?;
        row.as_ref().map(map_profile_row).transpose()
    }

    async fn list_profiles(&self) -> Result<Vec<Profile>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles ORDER BY user_id ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;
        rows.iter().map(map_profile_row).collect()
    }

    async fn set_assigned_mentor(
        &self,
        user: UserId,
        mentor: Option<UserId>,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mentor = mentor.map(|m| id_i64("mentor_id", m.value())).transpose()?;
        let res = sqlx::query(
            r"
            UPDATE profiles
            SET assigned_mentor_id = ?2, updated_at = ?3
            WHERE user_id = ?1
            ",
        )
        .bind(id_i64("user_id", user.value())?)
        .bind(mentor)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        expect_row(res.rows_affected())
    }

    async fn clear_assigned_mentor_if(
        &self,
        user: UserId,
        mentor: UserId,
        at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let res = sqlx::query(
            r"
            UPDATE profiles
            SET assigned_mentor_id = NULL, updated_at = ?3
            WHERE user_id = ?1 AND assigned_mentor_id = ?2
            ",
        )
        .bind(id_i64("user_id", user.value())?)
        .bind(id_i64("mentor_id", mentor.value())?)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(res.rows_affected() > 0)
    }

    async fn record_test(
        &self,
        user: UserId,
        kind: TestKind,
        result: &TestResult,
    ) -> Result<(), StorageError> {
        if result.score > result.total {
            return Err(StorageError::Serialization(format!(
                "score {} exceeds total {}",
                result.score, result.total
            )));
        }
        let sql = match kind {
            TestKind::Intro => {
                r"
                UPDATE profiles
                SET intro_test_done = 1, intro_test_score = ?2, intro_test_taken_at = ?3,
                    updated_at = ?3
                WHERE user_id = ?1
                "
            }
            TestKind::Exit => {
                r"
                UPDATE profiles
                SET end_test_done = 1, end_test_score = ?2, end_test_taken_at = ?3,
                    updated_at = ?3
                WHERE user_id = ?1
                "
            }
        };
        let res = sqlx::query(sql)
            .bind(id_i64("user_id", user.value())?)
            .bind(i64::from(result.score))
            .bind(result.taken_at)
            .execute(&self.pool)
            .await
            .map_err(db)?;
        expect_row(res.rows_affected())
    }

    async fn set_next_meeting(
        &self,
        user: UserId,
        slot: &MeetingSlot,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let res = sqlx::query(
            r"
            UPDATE profiles
            SET next_meeting_at = ?2, next_meeting_url = ?3, next_meeting_tool = ?4,
                next_meeting_notes = ?5, updated_at = ?6
            WHERE user_id = ?1
            ",
        )
        .bind(id_i64("user_id", user.value())?)
        .bind(slot.scheduled_at)
        .bind(url_to_column(slot.url.as_ref()))
        .bind(tool_to_column(slot.tool))
        .bind(slot.notes.as_str())
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        expect_row(res.rows_affected())
    }

    async fn set_meeting_defaults(
        &self,
        user: UserId,
        defaults: &MeetingDefaults,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let res = sqlx::query(
            r"
            UPDATE profiles
            SET default_meeting_url = ?2, default_meeting_tool = ?3, updated_at = ?4
            WHERE user_id = ?1
            ",
        )
        .bind(id_i64("user_id", user.value())?)
        .bind(url_to_column(defaults.url.as_ref()))
        .bind(tool_to_column(defaults.tool))
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        expect_row(res.rows_affected())
    }

    async fn reset_progress(&self, user: UserId, at: DateTime<Utc>) -> Result<(), StorageError> {
        let user_id = id_i64("user_id", user.value())?;
        let mut tx = self.pool.begin().await.map_err(db)?;

        let res = sqlx::query(
            r"
            UPDATE profiles
            SET intro_test_done = 0, intro_test_score = NULL, intro_test_taken_at = NULL,
                end_test_done = 0, end_test_score = NULL, end_test_taken_at = NULL,
                next_meeting_at = NULL, next_meeting_url = NULL, next_meeting_tool = NULL,
                next_meeting_notes = '', updated_at = ?2
            WHERE user_id = ?1
            ",
        )
        .bind(user_id)
        .bind(at)
        .execute(&mut *tx)
        .await
        .map_err(db)?;
        // dropping `tx` rolls back
        expect_row(res.rows_affected())?;

        sqlx::query(
            r"
            UPDATE session_completions
            SET completed = 0, completed_at = NULL
            WHERE user_id = ?1
            ",
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .map_err(db)?;

        tx.commit().await.map_err(db)?;
        Ok(())
    }
}
