//! Shared error types for the services crate.

use thiserror::Error;

use learn_core::model::{ItemError, SessionMode, SessionStateError};
use learn_core::{AnswerError, ClueError, PhaseError, SettingsError};
use storage::repository::StorageError;

/// Errors emitted by the session controller and its launcher.
///
/// Remote failures never show up here; they are recovered locally and
/// reported through `CompletionReport`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("session already completed")]
    Completed,
    #[error("session was closed")]
    Closed,
    #[error("not available in {0} mode")]
    WrongMode(SessionMode),
    #[error("already at the first item")]
    AtFirstItem,
    #[error(transparent)]
    Answer(#[from] AnswerError),
    #[error(transparent)]
    Phase(#[from] PhaseError),
    #[error(transparent)]
    Clue(#[from] ClueError),
    #[error(transparent)]
    State(#[from] SessionStateError),
    #[error(transparent)]
    Item(#[from] ItemError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors reported by an `AudioPlayer`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AudioError {
    #[error("audio source unavailable: {0}")]
    Unavailable(String),
    #[error("playback failed: {0}")]
    Playback(String),
}
