use chrono::{DateTime, Utc};
use mentor_core::model::{
    MeetingDefaults, MeetingSlot, MeetingTool, MeetingUrl, Message, MessageId, Profile,
    ProfileParts, SessionCompletion, SessionTemplate, TemplateId, TestRecord, User, UserId,
};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

/// Maps driver errors, turning uniqueness violations into `Conflict`.
pub(crate) fn db(e: sqlx::Error) -> StorageError {
    match e.as_database_error() {
        Some(dbe) if dbe.is_unique_violation() => StorageError::Conflict(dbe.message().to_owned()),
        _ => StorageError::Connection(e.to_string()),
    }
}

pub(crate) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn user_id_from_i64(v: i64) -> Result<UserId, StorageError> {
    Ok(UserId::new(i64_to_u64("user_id", v)?))
}

pub(crate) fn template_id_from_i64(v: i64) -> Result<TemplateId, StorageError> {
    Ok(TemplateId::new(i64_to_u64("template_id", v)?))
}

pub(crate) fn message_id_from_i64(v: i64) -> Result<MessageId, StorageError> {
    Ok(MessageId::new(i64_to_u64("message_id", v)?))
}

fn score_from_i64(v: Option<i64>) -> Result<Option<u32>, StorageError> {
    v.map(|s| u32::try_from(s).map_err(|_| StorageError::Serialization(format!("invalid score: {s}"))))
        .transpose()
}

fn tool_from_column(v: Option<String>) -> Result<Option<MeetingTool>, StorageError> {
    MeetingTool::parse_optional(v.as_deref()).map_err(ser)
}

fn url_from_column(v: Option<String>) -> Result<Option<MeetingUrl>, StorageError> {
    MeetingUrl::parse_optional(v.as_deref()).map_err(ser)
}

pub(crate) fn map_user_row(row: &SqliteRow) -> Result<User, StorageError> {
    Ok(User::from_persisted(
        user_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        row.try_get("username").map_err(ser)?,
        row.try_get("email").map_err(ser)?,
        row.try_get("first_name").map_err(ser)?,
        row.try_get("last_name").map_err(ser)?,
        row.try_get("created_at").map_err(ser)?,
    ))
}

fn test_record(row: &SqliteRow, prefix: &str) -> Result<TestRecord, StorageError> {
    let done: i64 = row.try_get(format!("{prefix}_done").as_str()).map_err(ser)?;
    let score: Option<i64> = row.try_get(format!("{prefix}_score").as_str()).map_err(ser)?;
    let taken_at: Option<DateTime<Utc>> = row
        .try_get(format!("{prefix}_taken_at").as_str())
        .map_err(ser)?;
    Ok(TestRecord {
        done: done != 0,
        score: score_from_i64(score)?,
        taken_at,
    })
}

pub(crate) fn map_profile_row(row: &SqliteRow) -> Result<Profile, StorageError> {
    let next_meeting = MeetingSlot {
        scheduled_at: row.try_get("next_meeting_at").map_err(ser)?,
        url: url_from_column(row.try_get("next_meeting_url").map_err(ser)?)?,
        tool: tool_from_column(row.try_get("next_meeting_tool").map_err(ser)?)?,
        notes: row.try_get("next_meeting_notes").map_err(ser)?,
    };
    let default_meeting = MeetingDefaults {
        url: url_from_column(row.try_get("default_meeting_url").map_err(ser)?)?,
        tool: tool_from_column(row.try_get("default_meeting_tool").map_err(ser)?)?,
    };

    Ok(Profile::from_persisted(ProfileParts {
        user_id: user_id_from_i64(row.try_get::<i64, _>("user_id").map_err(ser)?)?,
        intro_test: test_record(row, "intro_test")?,
        end_test: test_record(row, "end_test")?,
        assigned_mentor: row
            .try_get::<Option<i64>, _>("assigned_mentor_id")
            .map_err(ser)?
            .map(user_id_from_i64)
            .transpose()?,
        is_mentor: row.try_get::<i64, _>("is_mentor").map_err(ser)? != 0,
        next_meeting,
        default_meeting,
        created_at: row.try_get("created_at").map_err(ser)?,
        updated_at: row.try_get("updated_at").map_err(ser)?,
    }))
}

pub(crate) fn map_template_row(row: &SqliteRow) -> Result<SessionTemplate, StorageError> {
    let position: i64 = row.try_get("position").map_err(ser)?;
    SessionTemplate::new(
        template_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        row.try_get::<String, _>("title").map_err(ser)?,
        row.try_get::<String, _>("content_markdown").map_err(ser)?,
        row.try_get::<String, _>("mentor_content_markdown")
            .map_err(ser)?,
        u32::try_from(position)
            .map_err(|_| StorageError::Serialization(format!("invalid position: {position}")))?,
        row.try_get("created_at").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_completion_row(row: &SqliteRow) -> Result<SessionCompletion, StorageError> {
    Ok(SessionCompletion {
        user_id: user_id_from_i64(row.try_get::<i64, _>("user_id").map_err(ser)?)?,
        template_id: template_id_from_i64(row.try_get::<i64, _>("template_id").map_err(ser)?)?,
        completed: row.try_get::<i64, _>("completed").map_err(ser)? != 0,
        completed_at: row.try_get("completed_at").map_err(ser)?,
        notes: row.try_get("notes").map_err(ser)?,
    })
}

pub(crate) fn map_message_row(row: &SqliteRow) -> Result<Message, StorageError> {
    Ok(Message {
        id: message_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        sender: user_id_from_i64(row.try_get::<i64, _>("sender_id").map_err(ser)?)?,
        recipient: user_id_from_i64(row.try_get::<i64, _>("recipient_id").map_err(ser)?)?,
        body: row.try_get("body").map_err(ser)?,
        created_at: row.try_get("created_at").map_err(ser)?,
        read: row.try_get::<i64, _>("is_read").map_err(ser)? != 0,
        read_at: row.try_get("read_at").map_err(ser)?,
    })
}

pub(crate) fn tool_to_column(tool: Option<MeetingTool>) -> Option<&'static str> {
    tool.map(MeetingTool::as_str)
}

pub(crate) fn url_to_column(url: Option<&MeetingUrl>) -> Option<String> {
    url.map(|u| u.as_str().to_owned())
}
