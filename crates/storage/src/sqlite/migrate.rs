use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Runs the versioned migrations for the session schema.
///
/// Version 1 creates `learning_sessions` and `session_item_results`.
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

    // Version 1: sessions and per-item results.
    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS learning_sessions (
                    id TEXT PRIMARY KEY,
                    user_id TEXT NOT NULL,
                    mode TEXT NOT NULL CHECK (mode IN ('study', 'test')),
                    lesson_id INTEGER NOT NULL,
                    started_at TEXT NOT NULL,
                    completed_at TEXT,
                    items_total INTEGER CHECK (items_total >= 0),
                    items_answered INTEGER CHECK (items_answered >= 0),
                    items_correct INTEGER CHECK (items_correct >= 0),
                    items_half_correct INTEGER CHECK (items_half_correct >= 0),
                    total_points INTEGER CHECK (total_points >= 0),
                    max_points INTEGER CHECK (max_points >= 0),
                    elapsed_seconds INTEGER CHECK (elapsed_seconds >= 0)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS session_item_results (
                    session_id TEXT NOT NULL,
                    item_id INTEGER NOT NULL,
                    user_answer TEXT NOT NULL,
                    is_correct INTEGER NOT NULL CHECK (is_correct IN (0, 1)),
                    grade TEXT NOT NULL,
                    clue_level INTEGER NOT NULL CHECK (clue_level BETWEEN 0 AND 2),
                    points_earned INTEGER NOT NULL CHECK (points_earned >= 0),
                    max_points INTEGER NOT NULL CHECK (max_points >= 0),
                    score_letter TEXT NOT NULL,
                    user_note TEXT,
                    PRIMARY KEY (session_id, item_id),
                    FOREIGN KEY (session_id) REFERENCES learning_sessions(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_learning_sessions_user_lesson
                    ON learning_sessions (user_id, lesson_id, mode, started_at);
            ",
        )
        .execute(&mut *tx)
        .await?;

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
