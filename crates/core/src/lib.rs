//! Domain core of the learning session engine.
//!
//! Pure and synchronous: answer matching, scoring, the Study reveal sequence,
//! Test-mode clue levels and the session state they mutate.

#![forbid(unsafe_code)]

pub mod clue;
pub mod error;
pub mod matching;
pub mod model;
pub mod phase;
pub mod scoring;
pub mod settings;
pub mod time;

pub use clue::{ClueController, ClueError, HintVisibility};
pub use error::Error;
pub use matching::{AnswerError, MatchResult, SubmittedAnswer, evaluate, normalize_answer};
pub use phase::{ItemPhase, PhaseController, PhaseError, PhaseVisibility, RevealStep};
pub use scoring::{ClueLevel, Grade, MAX_POINTS_PER_ITEM, Score, ScoreLetter, score};
pub use settings::{SessionSettings, SettingsError};
pub use time::Clock;
