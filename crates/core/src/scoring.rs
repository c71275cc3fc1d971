//! Scoring of a single answer from the clue level and the mistake count.
//!
//! `score` is pure: identical inputs always produce identical outputs, which
//! keeps replayed and resumed sessions consistent.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Point ceiling of an item answered without hints.
pub const MAX_POINTS_PER_ITEM: u32 = 3;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClueLevelError {
    #[error("clue level must be 0, 1 or 2 (got {0})")]
    OutOfRange(u8),
}

//
// ─── CLUE LEVEL ────────────────────────────────────────────────────────────────
//

/// Number of progressive hints revealed for an item (0..=2).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub struct ClueLevel(u8);

impl ClueLevel {
    pub const NONE: Self = Self(0);
    pub const MAX: Self = Self(2);

    /// # Errors
    ///
    /// Returns `ClueLevelError::OutOfRange` for values above 2.
    pub fn new(value: u8) -> Result<Self, ClueLevelError> {
        if value > Self::MAX.0 {
            return Err(ClueLevelError::OutOfRange(value));
        }
        Ok(Self(value))
    }

    #[must_use]
    pub fn value(self) -> u8 {
        self.0
    }

    /// The next level up, or `None` once every hint is revealed.
    #[must_use]
    pub fn next(self) -> Option<Self> {
        if self < Self::MAX { Some(Self(self.0 + 1)) } else { None }
    }

    #[must_use]
    pub fn max_points(self) -> u32 {
        MAX_POINTS_PER_ITEM - u32::from(self.0)
    }
}

impl TryFrom<u8> for ClueLevel {
    type Error = ClueLevelError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ClueLevel> for u8 {
    fn from(level: ClueLevel) -> Self {
        level.0
    }
}

impl fmt::Display for ClueLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

//
// ─── GRADE ─────────────────────────────────────────────────────────────────────
//

/// Coarse correctness bucket derived from the mistake count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grade {
    Correct,
    HalfCorrect,
    Incorrect,
}

impl Grade {
    #[must_use]
    pub fn from_mistakes(mistake_count: usize) -> Self {
        match mistake_count {
            0 => Self::Correct,
            1 => Self::HalfCorrect,
            _ => Self::Incorrect,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Correct => "correct",
            Self::HalfCorrect => "half_correct",
            Self::Incorrect => "incorrect",
        }
    }
}

impl std::str::FromStr for Grade {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "correct" => Ok(Self::Correct),
            "half_correct" => Ok(Self::HalfCorrect),
            "incorrect" => Ok(Self::Incorrect),
            other => Err(format!("invalid grade: {other}")),
        }
    }
}

//
// ─── LETTER ────────────────────────────────────────────────────────────────────
//

/// Compact letter combining clue usage and accuracy.
///
/// Variants are declared best first, so `A < F` under `Ord`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ScoreLetter {
    A,
    B,
    C,
    D,
    F,
}

impl ScoreLetter {
    #[must_use]
    pub fn from_outcome(clue_level: ClueLevel, grade: Grade) -> Self {
        let rank = match grade {
            Grade::Incorrect => return Self::F,
            Grade::Correct => clue_level.value(),
            Grade::HalfCorrect => clue_level.value() + 1,
        };
        match rank {
            0 => Self::A,
            1 => Self::B,
            2 => Self::C,
            _ => Self::D,
        }
    }

    #[must_use]
    pub fn as_char(self) -> char {
        match self {
            Self::A => 'A',
            Self::B => 'B',
            Self::C => 'C',
            Self::D => 'D',
            Self::F => 'F',
        }
    }
}

impl fmt::Display for ScoreLetter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

impl std::str::FromStr for ScoreLetter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "A" => Ok(Self::A),
            "B" => Ok(Self::B),
            "C" => Ok(Self::C),
            "D" => Ok(Self::D),
            "F" => Ok(Self::F),
            other => Err(format!("invalid score letter: {other}")),
        }
    }
}

//
// ─── SCORE ─────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    pub max_points: u32,
    pub points_earned: u32,
    pub grade: Grade,
    pub letter: ScoreLetter,
    pub percent: u32,
}

/// Score one answer.
#[must_use]
pub fn score(clue_level: ClueLevel, mistake_count: usize) -> Score {
    let max_points = clue_level.max_points();
    let grade = Grade::from_mistakes(mistake_count);
    let points_earned = match grade {
        Grade::Correct => max_points,
        Grade::HalfCorrect => (max_points / 2).max(1),
        Grade::Incorrect => 0,
    };

    Score {
        max_points,
        points_earned,
        grade,
        letter: ScoreLetter::from_outcome(clue_level, grade),
        percent: percent(points_earned, max_points),
    }
}

/// `round(100 * earned / max)`, halves rounded up; zero when `max` is zero.
#[must_use]
pub fn percent(earned: u32, max: u32) -> u32 {
    if max == 0 {
        return 0;
    }
    let earned = u64::from(earned);
    let max = u64::from(max);
    let value = (200 * earned + max) / (2 * max);
    u32::try_from(value).unwrap_or(u32::MAX)
}
