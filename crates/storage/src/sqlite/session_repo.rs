use chrono::{DateTime, Utc};
use learn_core::model::{ItemProgress, LessonId, SessionMode, SessionStats, UserId};
use sqlx::Row;
use uuid::Uuid;

use super::SqliteRepository;
use super::mapping::{
    conn, id_i64, lesson_id_from_i64, map_item_result_row, parse_mode, ser, u32_from_i64,
    uuid_from_text,
};
use crate::repository::{CompletionRecord, RemoteSessionStore, StorageError};

/// A `learning_sessions` row as read back from the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSession {
    pub id: Uuid,
    pub user_id: UserId,
    pub mode: SessionMode,
    pub lesson_id: LessonId,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Present once the session has been completed.
    pub stats: Option<SessionStats>,
}

fn map_session_row(row: &sqlx::sqlite::SqliteRow) -> Result<StoredSession, StorageError> {
    let id = uuid_from_text("id", &row.try_get::<String, _>("id").map_err(ser)?)?;
    let user_id = UserId::new(uuid_from_text(
        "user_id",
        &row.try_get::<String, _>("user_id").map_err(ser)?,
    )?);
    let mode = parse_mode(&row.try_get::<String, _>("mode").map_err(ser)?)?;
    let lesson_id = lesson_id_from_i64(row.try_get::<i64, _>("lesson_id").map_err(ser)?)?;
    let started_at = row.try_get("started_at").map_err(ser)?;
    let completed_at: Option<DateTime<Utc>> = row.try_get("completed_at").map_err(ser)?;

    let stats = if completed_at.is_some() {
        let field = |name: &'static str| -> Result<u32, StorageError> {
            u32_from_i64(name, row.try_get::<i64, _>(name).map_err(ser)?)
        };
        let elapsed: i64 = row.try_get("elapsed_seconds").map_err(ser)?;
        Some(SessionStats {
            items_total: field("items_total")?,
            items_answered: field("items_answered")?,
            items_correct: field("items_correct")?,
            items_half_correct: field("items_half_correct")?,
            total_points: field("total_points")?,
            max_points: field("max_points")?,
            elapsed_seconds: u64::try_from(elapsed).map_err(|_| {
                StorageError::Serialization(format!("invalid elapsed_seconds: {elapsed}"))
            })?,
        })
    } else {
        None
    };

    Ok(StoredSession {
        id,
        user_id,
        mode,
        lesson_id,
        started_at,
        completed_at,
        stats,
    })
}

impl SqliteRepository {
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if no such session exists.
    pub async fn get_session(&self, id: Uuid) -> Result<StoredSession, StorageError> {
        let row = sqlx::query(
            r"
                SELECT
                    id, user_id, mode, lesson_id, started_at, completed_at,
                    items_total, items_answered, items_correct, items_half_correct,
                    total_points, max_points, elapsed_seconds
                FROM learning_sessions
                WHERE id = ?1
            ",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?
        .ok_or(StorageError::NotFound)?;

        map_session_row(&row)
    }

    /// Per-item results of a completed session, ordered by item id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the query or row mapping fails.
    pub async fn item_results(&self, id: Uuid) -> Result<Vec<ItemProgress>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT
                    item_id, user_answer, grade, clue_level,
                    points_earned, max_points, score_letter, user_note
                FROM session_item_results
                WHERE session_id = ?1
                ORDER BY item_id ASC
            ",
        )
        .bind(id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_item_result_row).collect()
    }
}

#[async_trait::async_trait]
impl RemoteSessionStore for SqliteRepository {
    async fn create_session(
        &self,
        user_id: UserId,
        mode: SessionMode,
        lesson_id: LessonId,
        started_at: DateTime<Utc>,
    ) -> Result<Uuid, StorageError> {
        let id = Uuid::new_v4();
        sqlx::query(
            r"
                INSERT INTO learning_sessions (id, user_id, mode, lesson_id, started_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
            ",
        )
        .bind(id.to_string())
        .bind(user_id.value().to_string())
        .bind(mode.as_str())
        .bind(id_i64("lesson_id", lesson_id.value())?)
        .bind(started_at)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        tracing::debug!(session_id = %id, %lesson_id, %mode, "remote session row created");
        Ok(id)
    }

    async fn complete_session(&self, record: &CompletionRecord) -> Result<(), StorageError> {
        let id = record.session_id.to_string();
        let mut tx = self.pool.begin().await.map_err(conn)?;

        let row = sqlx::query("SELECT completed_at FROM learning_sessions WHERE id = ?1")
            .bind(&id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(conn)?
            .ok_or(StorageError::NotFound)?;
        let completed_at: Option<DateTime<Utc>> = row.try_get("completed_at").map_err(ser)?;
        if completed_at.is_some() {
            tx.commit().await.map_err(conn)?;
            tracing::debug!(session_id = %id, "session already completed");
            return Ok(());
        }

        let stats = &record.stats;
        let elapsed = i64::try_from(stats.elapsed_seconds)
            .map_err(|_| StorageError::Serialization("elapsed_seconds overflow".into()))?;
        sqlx::query(
            r"
                UPDATE learning_sessions
                SET completed_at = ?2,
                    items_total = ?3,
                    items_answered = ?4,
                    items_correct = ?5,
                    items_half_correct = ?6,
                    total_points = ?7,
                    max_points = ?8,
                    elapsed_seconds = ?9
                WHERE id = ?1
            ",
        )
        .bind(&id)
        .bind(record.completed_at)
        .bind(i64::from(stats.items_total))
        .bind(i64::from(stats.items_answered))
        .bind(i64::from(stats.items_correct))
        .bind(i64::from(stats.items_half_correct))
        .bind(i64::from(stats.total_points))
        .bind(i64::from(stats.max_points))
        .bind(elapsed)
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        for item in &record.items {
            sqlx::query(
                r"
                    INSERT INTO session_item_results (
                        session_id, item_id, user_answer, is_correct, grade, clue_level,
                        points_earned, max_points, score_letter, user_note
                    )
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                    ON CONFLICT(session_id, item_id) DO NOTHING
                ",
            )
            .bind(&id)
            .bind(id_i64("item_id", item.item_id().value())?)
            .bind(item.user_answer())
            .bind(item.is_correct())
            .bind(item.grade().as_str())
            .bind(i64::from(item.clue_level().value()))
            .bind(i64::from(item.points_earned()))
            .bind(i64::from(item.max_points()))
            .bind(item.score_letter().to_string())
            .bind(item.user_note())
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        }

        tx.commit().await.map_err(conn)?;
        tracing::debug!(session_id = %id, items = record.items.len(), "session completion stored");
        Ok(())
    }
}
