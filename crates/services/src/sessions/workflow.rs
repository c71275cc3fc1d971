use std::sync::Arc;

use learn_core::SessionSettings;
use learn_core::model::{Lesson, SessionMode};

use super::controller::SessionController;
use crate::audio::AudioPlayer;
use crate::error::SessionError;
use crate::persistence::SessionPersistence;

/// Opens sessions and hands out controllers wired to the shared
/// persistence, audio and timing settings.
#[derive(Clone)]
pub struct SessionLoopService {
    persistence: SessionPersistence,
    audio: Arc<dyn AudioPlayer>,
    settings: SessionSettings,
}

impl SessionLoopService {
    #[must_use]
    pub fn new(persistence: SessionPersistence, audio: Arc<dyn AudioPlayer>) -> Self {
        Self {
            persistence,
            audio,
            settings: SessionSettings::default(),
        }
    }

    #[must_use]
    pub fn with_settings(mut self, settings: SessionSettings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn settings(&self) -> SessionSettings {
        self.settings
    }

    #[must_use]
    pub fn persistence(&self) -> &SessionPersistence {
        &self.persistence
    }

    /// Resume the unfinished `(mode, lesson)` pass or start a new one.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` if the session state cannot be built.
    pub async fn start(&self, lesson: Lesson, mode: SessionMode) -> Result<SessionController, SessionError> {
        let opened = self.persistence.open(mode, &lesson).await?;
        Ok(SessionController::start(
            lesson,
            opened,
            self.persistence.clone(),
            Arc::clone(&self.audio),
            self.settings,
        ))
    }
}
