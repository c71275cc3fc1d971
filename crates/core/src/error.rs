use thiserror::Error;

use crate::clue::ClueError;
use crate::matching::AnswerError;
use crate::model::{ItemError, MediaValidationError, SessionIdError, SessionStateError};
use crate::phase::PhaseError;
use crate::scoring::ClueLevelError;
use crate::settings::SettingsError;

/// Umbrella error for callers that do not care which domain rule failed.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Media(#[from] MediaValidationError),
    #[error(transparent)]
    Item(#[from] ItemError),
    #[error(transparent)]
    Answer(#[from] AnswerError),
    #[error(transparent)]
    ClueLevel(#[from] ClueLevelError),
    #[error(transparent)]
    Clue(#[from] ClueError),
    #[error(transparent)]
    Phase(#[from] PhaseError),
    #[error(transparent)]
    SessionId(#[from] SessionIdError),
    #[error(transparent)]
    SessionState(#[from] SessionStateError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
}
