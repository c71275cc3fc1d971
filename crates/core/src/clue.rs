//! Test-mode hint levels with lock-on-submit.

use thiserror::Error;

use crate::model::ItemProgress;
use crate::scoring::ClueLevel;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ClueError {
    #[error("item is locked after submission")]
    Locked,

    #[error("all clues are already revealed")]
    Exhausted,
}

/// Which parts of the hint are on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HintVisibility {
    pub image: bool,
    pub text: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClueController {
    level: ClueLevel,
    locked: bool,
}

impl ClueController {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// State for entering an item: stored history when answered, fresh otherwise.
    #[must_use]
    pub fn for_item(progress: Option<&ItemProgress>) -> Self {
        match progress {
            Some(p) => Self {
                level: p.clue_level(),
                locked: true,
            },
            None => Self::default(),
        }
    }

    #[must_use]
    pub fn level(&self) -> ClueLevel {
        self.level
    }

    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    #[must_use]
    pub fn hints_remaining(&self) -> u8 {
        if self.locked {
            0
        } else {
            ClueLevel::MAX.value() - self.level.value()
        }
    }

    /// # Errors
    ///
    /// Returns `ClueError::Locked` after submission and `ClueError::Exhausted`
    /// at the top level.
    pub fn reveal(&mut self) -> Result<ClueLevel, ClueError> {
        if self.locked {
            return Err(ClueError::Locked);
        }
        self.level = self.level.next().ok_or(ClueError::Exhausted)?;
        Ok(self.level)
    }

    /// # Errors
    ///
    /// Returns `ClueError::Locked` once an answer was submitted.
    pub fn ensure_open(&self) -> Result<(), ClueError> {
        if self.locked { Err(ClueError::Locked) } else { Ok(()) }
    }

    pub fn lock(&mut self) {
        self.locked = true;
    }

    /// Drop revealed clues of an unanswered item. Locked items keep their history.
    pub fn reset(&mut self) {
        if !self.locked {
            self.level = ClueLevel::NONE;
        }
    }

    #[must_use]
    pub fn hint_visibility(&self) -> HintVisibility {
        if self.locked {
            return HintVisibility {
                image: true,
                text: true,
            };
        }
        match self.level.value() {
            0 => HintVisibility {
                image: false,
                text: false,
            },
            1 => HintVisibility {
                image: true,
                text: false,
            },
            _ => HintVisibility {
                image: true,
                text: true,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ItemId;
    use crate::scoring::score;

    #[test]
    fn clues_reveal_up_to_two() {
        let mut clue = ClueController::new();
        assert_eq!(clue.hints_remaining(), 2);
        assert_eq!(clue.reveal().unwrap().value(), 1);
        assert_eq!(clue.hint_visibility(), HintVisibility { image: true, text: false });
        assert_eq!(clue.reveal().unwrap().value(), 2);
        assert_eq!(clue.hint_visibility(), HintVisibility { image: true, text: true });
        assert_eq!(clue.reveal().unwrap_err(), ClueError::Exhausted);
        assert_eq!(clue.level().value(), 2);
    }

    #[test]
    fn locked_item_restores_history_and_refuses_changes() {
        let level = ClueLevel::new(1).unwrap();
        let progress = ItemProgress::new(ItemId::new(1), "case", level, &score(level, 1));
        let mut clue = ClueController::for_item(Some(&progress));

        assert!(clue.is_locked());
        assert_eq!(clue.level(), level);
        assert_eq!(clue.hint_visibility(), HintVisibility { image: true, text: true });
        assert_eq!(clue.reveal().unwrap_err(), ClueError::Locked);
        assert_eq!(clue.ensure_open().unwrap_err(), ClueError::Locked);

        clue.reset();
        assert_eq!(clue.level(), level);
    }

    #[test]
    fn reset_clears_unlocked_level() {
        let mut clue = ClueController::new();
        clue.reveal().unwrap();
        clue.reset();
        assert_eq!(clue.level(), ClueLevel::NONE);
        assert_eq!(clue.hint_visibility(), HintVisibility { image: false, text: false });
    }
}
