use std::sync::Arc;

use learn_core::model::{
    Item, ItemProgress, Lesson, RemoteSync, SessionId, SessionMode, SessionState,
    SessionStateError, SessionStats,
};
use learn_core::{
    ClueController, ClueLevel, HintVisibility, ItemPhase, PhaseController, PhaseError,
    PhaseVisibility, RevealStep, SessionSettings, SubmittedAnswer, evaluate, score,
};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use super::events::{Advance, AnswerFeedback, SessionEvent};
use super::timers::{PendingTimer, Signal};
use crate::audio::AudioPlayer;
use crate::error::SessionError;
use crate::persistence::{CompletionReport, OpenedSession, SessionPersistence};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Active,
    Completed,
    Closed,
}

/// Drives one Study or Test pass over a lesson.
///
/// Owns the `SessionState`, the per-item phase and clue controllers, at most
/// one pending reveal timer and the elapsed-time ticker. Timers report back
/// through [`SessionController::next_event`]; signals for an item that is no
/// longer displayed are dropped there.
pub struct SessionController {
    lesson: Lesson,
    state: SessionState,
    sync: RemoteSync,
    resumed: bool,
    persistence: SessionPersistence,
    audio: Arc<dyn AudioPlayer>,
    settings: SessionSettings,
    phase: PhaseController,
    clue: ClueController,
    pending: Option<PendingTimer>,
    ticker: Option<PendingTimer>,
    /// Tick time not yet folded into whole elapsed seconds.
    tick_carry_ms: u64,
    signals_tx: UnboundedSender<Signal>,
    signals_rx: UnboundedReceiver<Signal>,
    status: Status,
    completion: Option<CompletionReport>,
}

impl SessionController {
    /// Must be called from within a tokio runtime; timers are spawned tasks.
    pub(crate) fn start(
        lesson: Lesson,
        opened: OpenedSession,
        persistence: SessionPersistence,
        audio: Arc<dyn AudioPlayer>,
        settings: SessionSettings,
    ) -> Self {
        let (signals_tx, signals_rx) = mpsc::unbounded_channel();
        let ticker = Some(PendingTimer::ticker(
            settings.tick_interval(),
            signals_tx.clone(),
        ));
        let mut controller = Self {
            lesson,
            state: opened.state,
            sync: opened.sync,
            resumed: opened.resumed,
            persistence,
            audio,
            settings,
            phase: PhaseController::new(),
            clue: ClueController::new(),
            pending: None,
            ticker,
            tick_carry_ms: 0,
            signals_tx,
            signals_rx,
            status: Status::Active,
            completion: None,
        };
        controller.enter_current();
        controller
    }

    // ─── accessors ──────────────────────────────────────────────────────────

    #[must_use]
    pub fn lesson(&self) -> &Lesson {
        &self.lesson
    }

    #[must_use]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    #[must_use]
    pub fn mode(&self) -> SessionMode {
        self.state.mode()
    }

    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        self.state.session_id()
    }

    #[must_use]
    pub fn remote_sync(&self) -> RemoteSync {
        self.sync
    }

    #[must_use]
    pub fn was_resumed(&self) -> bool {
        self.resumed
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.state.current_index()
    }

    #[must_use]
    pub fn current_item(&self) -> &Item {
        &self.lesson.items()[self.state.current_index()]
    }

    #[must_use]
    pub fn current_progress(&self) -> Option<&ItemProgress> {
        self.state.progress_for(self.state.current_item_id())
    }

    /// Reveal phase of the current item; `None` in Test mode.
    #[must_use]
    pub fn phase(&self) -> Option<ItemPhase> {
        (self.mode() == SessionMode::Study).then(|| self.phase.phase())
    }

    #[must_use]
    pub fn visibility(&self) -> PhaseVisibility {
        match self.mode() {
            SessionMode::Study => self.phase.visibility(),
            SessionMode::Test => PhaseVisibility {
                target_text: self.clue.is_locked(),
                hint: self.clue.level() > ClueLevel::NONE || self.clue.is_locked(),
                input: !self.clue.is_locked(),
                feedback: self.clue.is_locked(),
            },
        }
    }

    #[must_use]
    pub fn hint_visibility(&self) -> HintVisibility {
        match self.mode() {
            SessionMode::Test => self.clue.hint_visibility(),
            SessionMode::Study => {
                let shown = self.phase.visibility().hint;
                HintVisibility {
                    image: shown,
                    text: shown,
                }
            }
        }
    }

    #[must_use]
    pub fn clue_level(&self) -> ClueLevel {
        self.clue.level()
    }

    #[must_use]
    pub fn hints_remaining(&self) -> u8 {
        match self.mode() {
            SessionMode::Test => self.clue.hints_remaining(),
            SessionMode::Study => 0,
        }
    }

    #[must_use]
    pub fn stats(&self) -> SessionStats {
        self.state.stats()
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == Status::Completed
    }

    #[must_use]
    pub fn completion(&self) -> Option<&CompletionReport> {
        self.completion.as_ref()
    }

    // ─── events ─────────────────────────────────────────────────────────────

    /// Wait for the next automatic change: a reveal phase advancing or an
    /// elapsed-time tick. Returns `None` once the session is completed or
    /// closed.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        loop {
            if self.status != Status::Active {
                return None;
            }
            let signal = self.signals_rx.recv().await?;
            if let Some(event) = self.handle_signal(signal) {
                return Some(event);
            }
        }
    }

    fn handle_signal(&mut self, signal: Signal) -> Option<SessionEvent> {
        if self.status != Status::Active {
            return None;
        }
        match signal {
            Signal::Tick => {
                self.count_tick();
                Some(SessionEvent::Tick {
                    elapsed_seconds: self.state.elapsed_seconds(),
                })
            }
            Signal::Settled { epoch } => {
                if self.mode() != SessionMode::Study {
                    return None;
                }
                let index = self.state.current_index();
                let item = &self.lesson.items()[index];
                match self.phase.settle(epoch, item) {
                    Ok(next) => {
                        self.pending = None;
                        if let Some(step) = next {
                            self.schedule(step);
                        }
                        let phase = self.phase.phase();
                        tracing::debug!(index, %phase, "phase advanced");
                        Some(SessionEvent::PhaseChanged { index, phase })
                    }
                    Err(PhaseError::Stale { got, current }) => {
                        tracing::debug!(got, current, "stale reveal signal dropped");
                        None
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "reveal signal ignored");
                        None
                    }
                }
            }
        }
    }

    // ─── learner actions ────────────────────────────────────────────────────

    /// Score and store the first answer for the current item.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Answer` for blank input, `Phase` outside
    /// `ShowInput` (Study), `Clue(Locked)` for answered items (Test) and
    /// `State(AlreadyAnswered)` when progress already exists.
    pub fn submit_answer(&mut self, raw: &str) -> Result<AnswerFeedback, SessionError> {
        self.ensure_active()?;
        let answer = SubmittedAnswer::parse(raw)?;
        match self.mode() {
            SessionMode::Study => self.phase.ensure_input()?,
            SessionMode::Test => self.clue.ensure_open()?,
        }

        let item = self.current_item();
        let item_id = item.id();
        let match_result = evaluate(&answer, item.accepted_answers());
        let clue_level = match self.mode() {
            SessionMode::Study => ClueLevel::NONE,
            SessionMode::Test => self.clue.level(),
        };
        let outcome = score(clue_level, match_result.mistake_count);
        let progress = ItemProgress::new(item_id, answer.raw().trim(), clue_level, &outcome);

        let progress = self.state.record_answer(progress)?.clone();
        match self.mode() {
            SessionMode::Study => self.phase.mark_answered()?,
            SessionMode::Test => self.clue.lock(),
        }
        self.persist();

        tracing::debug!(
            %item_id,
            grade = progress.grade().as_str(),
            points = progress.points_earned(),
            "answer recorded"
        );
        Ok(AnswerFeedback {
            progress,
            match_result,
        })
    }

    /// Reveal one more hint level (Test mode).
    ///
    /// # Errors
    ///
    /// Returns `WrongMode` in Study mode and `Clue` when locked or exhausted.
    pub fn reveal_clue(&mut self) -> Result<ClueLevel, SessionError> {
        self.ensure_active()?;
        self.ensure_mode(SessionMode::Test)?;
        Ok(self.clue.reveal()?)
    }

    /// Edit the note on the current, answered item (Study mode).
    ///
    /// # Errors
    ///
    /// Returns `WrongMode` in Test mode and `State(NoProgress)` before an
    /// answer was submitted.
    pub fn edit_note(&mut self, note: Option<String>) -> Result<(), SessionError> {
        self.ensure_active()?;
        self.ensure_mode(SessionMode::Study)?;
        self.state.set_note(self.state.current_item_id(), note)?;
        self.persist();
        Ok(())
    }

    // ─── navigation ─────────────────────────────────────────────────────────

    /// Mark the current item completed and move on, completing the session
    /// after the last item.
    ///
    /// # Errors
    ///
    /// Returns `Completed`/`Closed` on an inactive session.
    pub async fn advance(&mut self) -> Result<Advance, SessionError> {
        self.ensure_active()?;
        let index = self.state.current_index();
        self.state.mark_completed(index)?;

        if self.state.is_last_index() {
            let report = self.complete().await;
            return Ok(Advance::Completed(report));
        }

        self.cancel_pending();
        self.state.set_current_index(index + 1)?;
        self.enter_current();
        self.persist();
        Ok(Advance::Moved(index + 1))
    }

    /// Show another item without marking the departed one completed.
    ///
    /// # Errors
    ///
    /// Returns `State(IndexOutOfRange)` and leaves everything untouched for an
    /// invalid index.
    pub fn jump_to(&mut self, index: usize) -> Result<(), SessionError> {
        self.ensure_active()?;
        let len = self.state.item_count();
        if index >= len {
            return Err(SessionStateError::IndexOutOfRange { index, len }.into());
        }

        self.cancel_pending();
        self.state.set_current_index(index)?;
        self.enter_current();
        self.persist();
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `AtFirstItem` on the first item.
    pub fn previous(&mut self) -> Result<usize, SessionError> {
        let index = self
            .state
            .current_index()
            .checked_sub(1)
            .ok_or(SessionError::AtFirstItem)?;
        self.jump_to(index)?;
        Ok(index)
    }

    /// Reset the current item's transient reveal state. Stored progress is
    /// never touched.
    ///
    /// # Errors
    ///
    /// Returns `Completed`/`Closed` on an inactive session.
    pub fn restart_current(&mut self) -> Result<(), SessionError> {
        self.ensure_active()?;
        match self.mode() {
            SessionMode::Study => {
                self.cancel_pending();
                let step = self.phase.enter(&self.lesson.items()[self.state.current_index()]);
                self.schedule(step);
            }
            SessionMode::Test => self.clue.reset(),
        }
        Ok(())
    }

    /// Complete the session early.
    ///
    /// # Errors
    ///
    /// Returns `Completed`/`Closed` on an inactive session.
    pub async fn finish(&mut self) -> Result<CompletionReport, SessionError> {
        self.ensure_active()?;
        Ok(self.complete().await)
    }

    /// Stop timers and audio and write a final snapshot for a later resume.
    pub fn close(&mut self) {
        if self.status != Status::Active {
            return;
        }
        self.stop_all();
        self.persist();
        self.status = Status::Closed;
        tracing::info!(session_id = %self.state.session_id(), "session closed for resume");
    }

    // ─── internals ──────────────────────────────────────────────────────────

    async fn complete(&mut self) -> CompletionReport {
        self.stop_all();
        let report = self.persistence.complete(&self.state, &mut self.sync).await;
        self.status = Status::Completed;
        self.completion = Some(report.clone());
        report
    }

    fn enter_current(&mut self) {
        let index = self.state.current_index();
        let item = &self.lesson.items()[index];
        self.clue = ClueController::for_item(self.state.progress_for(item.id()));
        if self.mode() == SessionMode::Study {
            let step = self.phase.enter(item);
            self.schedule(step);
        }
    }

    /// Play the step's audio, wait the settle delay, then signal `epoch`.
    fn schedule(&mut self, step: RevealStep) {
        let audio = Arc::clone(&self.audio);
        let signals = self.signals_tx.clone();
        let delay = self.settings.settle_delay();
        let RevealStep { epoch, phase, audio: clip } = step;
        tracing::debug!(epoch, %phase, "reveal step scheduled");

        // Replacing the handle aborts any previous task.
        self.pending = Some(PendingTimer::spawn(async move {
            if let Some(uri) = clip {
                if let Err(e) = audio.play(&uri).await {
                    tracing::warn!(%uri, error = %e, "audio playback failed");
                }
            }
            tokio::time::sleep(delay).await;
            let _ = signals.send(Signal::Settled { epoch });
        }));
    }

    fn cancel_pending(&mut self) {
        if self.pending.take().is_some() {
            self.audio.stop();
            self.phase.cancel();
        }
    }

    /// Fold queued ticks into the state, then stop every timer.
    fn stop_all(&mut self) {
        self.cancel_pending();
        self.ticker = None;
        while let Ok(signal) = self.signals_rx.try_recv() {
            if signal == Signal::Tick {
                self.count_tick();
            }
        }
        self.audio.stop();
    }

    fn count_tick(&mut self) {
        let total = self.tick_carry_ms + self.settings.tick_interval_ms();
        self.state.add_elapsed(total / 1_000);
        self.tick_carry_ms = total % 1_000;
    }

    fn persist(&self) {
        self.persistence.persist(&self.state, self.sync);
    }

    fn ensure_active(&self) -> Result<(), SessionError> {
        match self.status {
            Status::Active => Ok(()),
            Status::Completed => Err(SessionError::Completed),
            Status::Closed => Err(SessionError::Closed),
        }
    }

    fn ensure_mode(&self, mode: SessionMode) -> Result<(), SessionError> {
        if self.mode() == mode {
            Ok(())
        } else {
            Err(SessionError::WrongMode(self.mode()))
        }
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.pending = None;
        self.ticker = None;
        self.audio.stop();
    }
}
