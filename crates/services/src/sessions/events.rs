use learn_core::ItemPhase;
use learn_core::MatchResult;
use learn_core::model::ItemProgress;

use crate::persistence::CompletionReport;

/// Automatic changes reported by `SessionController::next_event`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// The Study reveal sequence moved on for the item at `index`.
    PhaseChanged { index: usize, phase: ItemPhase },
    /// One more second of elapsed time was counted.
    Tick { elapsed_seconds: u64 },
}

/// Result of `SessionController::advance`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    Moved(usize),
    Completed(CompletionReport),
}

/// Outcome of a submitted answer, for feedback display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerFeedback {
    pub progress: ItemProgress,
    pub match_result: MatchResult,
}
