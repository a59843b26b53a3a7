use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

const SCHEMA_V1: [&str; 9] = [
    r"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            email TEXT NOT NULL,
            first_name TEXT NOT NULL DEFAULT '',
            last_name TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL
        );
    ",
    r"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_users_email_nocase
            ON users (email COLLATE NOCASE);
    ",
    r"
        CREATE TABLE IF NOT EXISTS profiles (
            user_id INTEGER PRIMARY KEY,
            intro_test_done INTEGER NOT NULL DEFAULT 0 CHECK (intro_test_done IN (0, 1)),
            intro_test_score INTEGER CHECK (intro_test_score >= 0),
            intro_test_taken_at TEXT,
            end_test_done INTEGER NOT NULL DEFAULT 0 CHECK (end_test_done IN (0, 1)),
            end_test_score INTEGER CHECK (end_test_score >= 0),
            end_test_taken_at TEXT,
            assigned_mentor_id INTEGER,
            is_mentor INTEGER NOT NULL DEFAULT 0 CHECK (is_mentor IN (0, 1)),
            next_meeting_at TEXT,
            next_meeting_url TEXT,
            next_meeting_tool TEXT,
            next_meeting_notes TEXT NOT NULL DEFAULT '',
            default_meeting_url TEXT,
            default_meeting_tool TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
            FOREIGN KEY (assigned_mentor_id) REFERENCES users(id) ON DELETE SET NULL
        );
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_profiles_assigned_mentor
            ON profiles (assigned_mentor_id);
    ",
    r"
        CREATE TABLE IF NOT EXISTS session_templates (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            content_markdown TEXT NOT NULL DEFAULT '',
            mentor_content_markdown TEXT NOT NULL DEFAULT '',
            position INTEGER NOT NULL DEFAULT 0 CHECK (position >= 0),
            created_at TEXT NOT NULL
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS session_completions (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL,
            template_id INTEGER NOT NULL,
            completed INTEGER NOT NULL DEFAULT 0 CHECK (completed IN (0, 1)),
            completed_at TEXT,
            notes TEXT NOT NULL DEFAULT '',
            UNIQUE (user_id, template_id),
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
            FOREIGN KEY (template_id) REFERENCES session_templates(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            sender_id INTEGER NOT NULL,
            recipient_id INTEGER NOT NULL,
            body TEXT NOT NULL CHECK (length(trim(body)) > 0),
            created_at TEXT NOT NULL,
            is_read INTEGER NOT NULL DEFAULT 0 CHECK (is_read IN (0, 1)),
            read_at TEXT,
            FOREIGN KEY (sender_id) REFERENCES users(id) ON DELETE CASCADE,
            FOREIGN KEY (recipient_id) REFERENCES users(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_messages_pair_created
            ON messages (sender_id, recipient_id, created_at);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_messages_recipient_unread
            ON messages (recipient_id, is_read);
    ",
];

/// Applies pending schema versions inside one transaction each.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        for statement in SCHEMA_V1 {
            sqlx::query(statement).execute(&mut *tx).await?;
        }

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
    }

    Ok(())
}
