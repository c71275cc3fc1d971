use learn_core::model::{ItemId, ItemProgress, LessonId, SessionMode};
use learn_core::scoring::{ClueLevel, Grade, Score, ScoreLetter, percent};
use sqlx::Row;
use uuid::Uuid;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

pub(crate) fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn lesson_id_from_i64(v: i64) -> Result<LessonId, StorageError> {
    Ok(LessonId::new(i64_to_u64("lesson_id", v)?))
}

pub(crate) fn item_id_from_i64(v: i64) -> Result<ItemId, StorageError> {
    Ok(ItemId::new(i64_to_u64("item_id", v)?))
}

pub(crate) fn uuid_from_text(field: &'static str, raw: &str) -> Result<Uuid, StorageError> {
    Uuid::parse_str(raw).map_err(|_| StorageError::Serialization(format!("invalid {field}: {raw}")))
}

pub(crate) fn parse_mode(s: &str) -> Result<SessionMode, StorageError> {
    s.parse::<SessionMode>().map_err(ser)
}

pub(crate) fn map_item_result_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<ItemProgress, StorageError> {
    let item_id = item_id_from_i64(row.try_get::<i64, _>("item_id").map_err(ser)?)?;
    let user_answer: String = row.try_get("user_answer").map_err(ser)?;

    let clue_raw: i64 = row.try_get("clue_level").map_err(ser)?;
    let clue_level = u8::try_from(clue_raw)
        .map_err(|_| StorageError::Serialization(format!("invalid clue_level: {clue_raw}")))
        .and_then(|v| ClueLevel::new(v).map_err(ser))?;

    let grade: Grade = row
        .try_get::<String, _>("grade")
        .map_err(ser)?
        .parse()
        .map_err(ser)?;
    let letter: ScoreLetter = row
        .try_get::<String, _>("score_letter")
        .map_err(ser)?
        .parse()
        .map_err(ser)?;
    let points_earned = u32_from_i64(
        "points_earned",
        row.try_get::<i64, _>("points_earned").map_err(ser)?,
    )?;
    let max_points = u32_from_i64("max_points", row.try_get::<i64, _>("max_points").map_err(ser)?)?;

    let score = Score {
        max_points,
        points_earned,
        grade,
        letter,
        percent: percent(points_earned, max_points),
    };
    let mut progress = ItemProgress::new(item_id, user_answer, clue_level, &score);
    progress.set_note(row.try_get("user_note").map_err(ser)?);
    Ok(progress)
}
