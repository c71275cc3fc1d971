use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::model::ids::ItemId;
use crate::scoring::{ClueLevel, Grade, Score, ScoreLetter};

//
// ─── SESSION MODE ──────────────────────────────────────────────────────────────
//

/// Kind of pass over a lesson. Fixed for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// Timed reveal sequence per item, answered without hints.
    Study,
    /// Free recall with optional progressive hints.
    Test,
}

impl SessionMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Study => "study",
            Self::Test => "test",
        }
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "study" => Ok(Self::Study),
            "test" => Ok(Self::Test),
            other => Err(format!("invalid session mode: {other}")),
        }
    }
}

//
// ─── ITEM PROGRESS ─────────────────────────────────────────────────────────────
//

/// Recorded outcome of answering one item.
///
/// Created on the first submission. Only `user_note` may change afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemProgress {
    item_id: ItemId,
    user_answer: String,
    is_correct: bool,
    grade: Grade,
    clue_level: ClueLevel,
    points_earned: u32,
    max_points: u32,
    score_letter: ScoreLetter,
    #[serde(default)]
    user_note: Option<String>,
}

impl ItemProgress {
    #[must_use]
    pub fn new(item_id: ItemId, user_answer: impl Into<String>, clue_level: ClueLevel, score: &Score) -> Self {
        Self {
            item_id,
            user_answer: user_answer.into(),
            is_correct: score.grade == Grade::Correct,
            grade: score.grade,
            clue_level,
            points_earned: score.points_earned,
            max_points: score.max_points,
            score_letter: score.letter,
            user_note: None,
        }
    }

    #[must_use]
    pub fn item_id(&self) -> ItemId {
        self.item_id
    }

    /// Always true: progress only exists once an answer was submitted.
    #[must_use]
    pub fn has_answered(&self) -> bool {
        true
    }

    #[must_use]
    pub fn user_answer(&self) -> &str {
        &self.user_answer
    }

    #[must_use]
    pub fn is_correct(&self) -> bool {
        self.is_correct
    }

    #[must_use]
    pub fn grade(&self) -> Grade {
        self.grade
    }

    #[must_use]
    pub fn clue_level(&self) -> ClueLevel {
        self.clue_level
    }

    #[must_use]
    pub fn points_earned(&self) -> u32 {
        self.points_earned
    }

    #[must_use]
    pub fn max_points(&self) -> u32 {
        self.max_points
    }

    #[must_use]
    pub fn score_letter(&self) -> ScoreLetter {
        self.score_letter
    }

    #[must_use]
    pub fn user_note(&self) -> Option<&str> {
        self.user_note.as_deref()
    }

    /// Replace the note. Blank notes clear it.
    pub fn set_note(&mut self, note: Option<String>) {
        self.user_note = note.filter(|n| !n.trim().is_empty());
    }
}
