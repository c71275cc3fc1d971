//! Study-mode reveal sequence for a single item.
//!
//! The controller is a plain state machine. Every automatic transition is
//! tagged with an epoch; a completion signal carrying an older epoch belongs
//! to an item (or a visit) that is no longer displayed and is refused.

use std::fmt;

use thiserror::Error;

use crate::model::{AudioChannel, Item, MediaUri};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PhaseError {
    #[error("answers are not accepted during {0}")]
    NotAcceptingInput(ItemPhase),

    #[error("{0} does not advance on its own")]
    NotRevealing(ItemPhase),

    #[error("stale reveal signal (epoch {got}, current {current})")]
    Stale { got: u64, current: u64 },
}

//
// ─── PHASE ─────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ItemPhase {
    RevealFirst,
    RevealSecond,
    ShowTrigger,
    ShowInput,
    ShowFeedback,
}

impl ItemPhase {
    /// Audio played while this phase is showing, if the phase auto-advances.
    #[must_use]
    pub fn audio_channel(self) -> Option<AudioChannel> {
        match self {
            Self::RevealFirst => Some(AudioChannel::Meaning),
            Self::RevealSecond => Some(AudioChannel::Target),
            Self::ShowTrigger => Some(AudioChannel::Trigger),
            Self::ShowInput | Self::ShowFeedback => None,
        }
    }

    /// Automatic successor of a reveal phase.
    #[must_use]
    pub fn next(self) -> Option<Self> {
        match self {
            Self::RevealFirst => Some(Self::RevealSecond),
            Self::RevealSecond => Some(Self::ShowTrigger),
            Self::ShowTrigger => Some(Self::ShowInput),
            Self::ShowInput | Self::ShowFeedback => None,
        }
    }

    #[must_use]
    pub fn is_reveal(self) -> bool {
        self.audio_channel().is_some()
    }

    #[must_use]
    pub fn visibility(self) -> PhaseVisibility {
        PhaseVisibility {
            target_text: self >= Self::RevealSecond,
            hint: self >= Self::ShowTrigger,
            input: self >= Self::ShowInput,
            feedback: self == Self::ShowFeedback,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RevealFirst => "reveal_first",
            Self::RevealSecond => "reveal_second",
            Self::ShowTrigger => "show_trigger",
            Self::ShowInput => "show_input",
            Self::ShowFeedback => "show_feedback",
        }
    }
}

impl fmt::Display for ItemPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the presentation layer may show for the current phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseVisibility {
    pub target_text: bool,
    pub hint: bool,
    pub input: bool,
    pub feedback: bool,
}

/// A suspend point: play `audio` (if any), wait the settle delay, then call
/// [`PhaseController::settle`] with `epoch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevealStep {
    pub epoch: u64,
    pub phase: ItemPhase,
    pub audio: Option<MediaUri>,
}

//
// ─── CONTROLLER ────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseController {
    phase: ItemPhase,
    epoch: u64,
}

impl Default for PhaseController {
    fn default() -> Self {
        Self {
            phase: ItemPhase::RevealFirst,
            epoch: 0,
        }
    }
}

impl PhaseController {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn phase(&self) -> ItemPhase {
        self.phase
    }

    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    #[must_use]
    pub fn visibility(&self) -> PhaseVisibility {
        self.phase.visibility()
    }

    /// (Re)enter an item at `RevealFirst`, invalidating any pending step.
    pub fn enter(&mut self, item: &Item) -> RevealStep {
        self.phase = ItemPhase::RevealFirst;
        self.epoch += 1;
        self.step(item)
    }

    /// Invalidate the pending step without changing phase.
    pub fn cancel(&mut self) {
        self.epoch += 1;
    }

    /// Complete the pending step and move to the next phase.
    ///
    /// Returns the next step while the item is still revealing, or `None` once
    /// `ShowInput` is reached.
    ///
    /// # Errors
    ///
    /// Returns `PhaseError::Stale` for an outdated epoch and
    /// `PhaseError::NotRevealing` when the phase has no automatic successor.
    pub fn settle(&mut self, epoch: u64, item: &Item) -> Result<Option<RevealStep>, PhaseError> {
        if epoch != self.epoch {
            return Err(PhaseError::Stale {
                got: epoch,
                current: self.epoch,
            });
        }
        let next = self.phase.next().ok_or(PhaseError::NotRevealing(self.phase))?;
        self.phase = next;
        self.epoch += 1;
        Ok(next.is_reveal().then(|| self.step(item)))
    }

    /// # Errors
    ///
    /// Returns `PhaseError::NotAcceptingInput` outside `ShowInput`.
    pub fn ensure_input(&self) -> Result<(), PhaseError> {
        if self.phase == ItemPhase::ShowInput {
            Ok(())
        } else {
            Err(PhaseError::NotAcceptingInput(self.phase))
        }
    }

    /// Move from `ShowInput` to `ShowFeedback` after a submission.
    ///
    /// # Errors
    ///
    /// Returns `PhaseError::NotAcceptingInput` outside `ShowInput`.
    pub fn mark_answered(&mut self) -> Result<(), PhaseError> {
        self.ensure_input()?;
        self.phase = ItemPhase::ShowFeedback;
        self.epoch += 1;
        Ok(())
    }

    fn step(&self, item: &Item) -> RevealStep {
        let audio = self
            .phase
            .audio_channel()
            .and_then(|channel| item.audio().channel(channel))
            .cloned();
        RevealStep {
            epoch: self.epoch,
            phase: self.phase,
            audio,
        }
    }
}
