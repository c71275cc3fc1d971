//! Opaque audio capability used by the Study reveal sequence.

use async_trait::async_trait;
use learn_core::model::MediaUri;

use crate::error::AudioError;

/// Plays a clip to completion. `stop` interrupts whatever is playing.
///
/// The future returned by `play` may be dropped at any point; implementations
/// must tolerate that as a cancellation.
#[async_trait]
pub trait AudioPlayer: Send + Sync {
    /// # Errors
    ///
    /// Returns `AudioError` if the clip cannot be played.
    async fn play(&self, uri: &MediaUri) -> Result<(), AudioError>;

    fn stop(&self);
}

/// Player that finishes every clip immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentAudio;

#[async_trait]
impl AudioPlayer for SilentAudio {
    async fn play(&self, _uri: &MediaUri) -> Result<(), AudioError> {
        Ok(())
    }

    fn stop(&self) {}
}
