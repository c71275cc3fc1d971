use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use learn_core::model::{
    AudioChannel, Hint, Item, ItemId, Lesson, LessonId, MediaUri, RemoteSync, SessionMode,
    SessionStateError, UserId,
};
use learn_core::time::fixed_clock;
use learn_core::{ClueError, Grade, ItemPhase, PhaseError, ScoreLetter, SessionSettings};
use proptest::prelude::*;
use services::{
    Advance, AudioError, AudioPlayer, CompletionOutcome, SessionController, SessionError,
    SessionEvent, SessionLoopService, SessionPersistence, StaticIdentity,
};
use storage::repository::{
    InMemoryRemoteStore, InMemorySnapshotStore, SnapshotKey, SnapshotStore, Storage,
};
use uuid::Uuid;

#[derive(Default)]
struct RecordingAudio {
    plays: Mutex<Vec<String>>,
    stops: AtomicUsize,
}

impl RecordingAudio {
    fn plays(&self) -> Vec<String> {
        self.plays.lock().unwrap().clone()
    }

    fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioPlayer for RecordingAudio {
    async fn play(&self, uri: &MediaUri) -> Result<(), AudioError> {
        self.plays.lock().unwrap().push(uri.to_string());
        Ok(())
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

struct Harness {
    remote: InMemoryRemoteStore,
    snapshots: InMemorySnapshotStore,
    audio: Arc<RecordingAudio>,
    service: SessionLoopService,
}

fn harness(user: Option<UserId>, settings: SessionSettings) -> Harness {
    let remote = InMemoryRemoteStore::new();
    let snapshots = InMemorySnapshotStore::new();
    let audio = Arc::new(RecordingAudio::default());
    let storage = Storage {
        snapshots: Arc::new(snapshots.clone()),
        remote: Arc::new(remote.clone()),
    };
    let identity = user.map_or_else(StaticIdentity::guest, StaticIdentity::user);
    let persistence = SessionPersistence::new(fixed_clock(), storage, Arc::new(identity));
    let service = SessionLoopService::new(persistence, audio.clone()).with_settings(settings);
    Harness {
        remote,
        snapshots,
        audio,
        service,
    }
}

fn slow_ticks() -> SessionSettings {
    SessionSettings::new(1_000, 60_000).unwrap()
}

fn casa_lesson() -> Lesson {
    let items = (1..=3)
        .map(|id| {
            Item::new(ItemId::new(id), format!("house {id}"), ["casa"])
                .unwrap()
                .with_audio(
                    AudioChannel::Meaning,
                    MediaUri::parse(format!("audio/{id}-meaning.mp3")).unwrap(),
                )
                .with_audio(
                    AudioChannel::Trigger,
                    MediaUri::parse(format!("audio/{id}-trigger.mp3")).unwrap(),
                )
                .with_hint(Hint {
                    text: Some("a place to live".into()),
                    image: None,
                })
        })
        .collect();
    Lesson::new(LessonId::new(11), "Home", items).unwrap()
}

fn key(mode: SessionMode) -> SnapshotKey {
    SnapshotKey::new(mode, LessonId::new(11))
}

async fn reach_input(controller: &mut SessionController) {
    while controller.phase() != Some(ItemPhase::ShowInput) {
        controller.next_event().await.expect("session is active");
    }
}

// ─── Study reveal sequence ─────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn study_reveal_runs_in_order_with_audio() {
    let h = harness(None, slow_ticks());
    let mut c = h.service.start(casa_lesson(), SessionMode::Study).await.unwrap();

    assert_eq!(c.phase(), Some(ItemPhase::RevealFirst));
    assert!(!c.visibility().target_text);
    assert!(matches!(
        c.submit_answer("casa"),
        Err(SessionError::Phase(PhaseError::NotAcceptingInput(ItemPhase::RevealFirst)))
    ));

    let expected = [
        ItemPhase::RevealSecond,
        ItemPhase::ShowTrigger,
        ItemPhase::ShowInput,
    ];
    for phase in expected {
        assert_eq!(
            c.next_event().await,
            Some(SessionEvent::PhaseChanged { index: 0, phase })
        );
    }
    assert!(c.visibility().input);
    assert!(c.hint_visibility().text);
    assert_eq!(
        h.audio.plays(),
        vec!["audio/1-meaning.mp3".to_string(), "audio/1-trigger.mp3".to_string()]
    );

    let feedback = c.submit_answer("Casa ").unwrap();
    assert!(feedback.match_result.is_exact_match);
    assert_eq!(feedback.progress.grade(), Grade::Correct);
    assert_eq!(feedback.progress.points_earned(), 3);
    assert_eq!(feedback.progress.score_letter(), ScoreLetter::A);
    assert_eq!(c.phase(), Some(ItemPhase::ShowFeedback));
}

#[tokio::test(start_paused = true)]
async fn stale_reveal_signal_after_jump_is_dropped() {
    let h = harness(None, slow_ticks());
    let mut c = h.service.start(casa_lesson(), SessionMode::Study).await.unwrap();

    // Let the first step's signal land in the queue unconsumed.
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    c.jump_to(1).unwrap();
    assert!(h.audio.stops() >= 1);
    assert_eq!(c.phase(), Some(ItemPhase::RevealFirst));

    assert_eq!(
        c.next_event().await,
        Some(SessionEvent::PhaseChanged {
            index: 1,
            phase: ItemPhase::RevealSecond
        })
    );
    assert!(c.state().completed_indices().is_empty());
}

#[tokio::test(start_paused = true)]
async fn stale_reveal_signal_after_restart_is_dropped() {
    let h = harness(None, slow_ticks());
    let mut c = h.service.start(casa_lesson(), SessionMode::Study).await.unwrap();

    tokio::time::sleep(Duration::from_millis(1_500)).await;
    c.restart_current().unwrap();
    let restarted_at = tokio::time::Instant::now();
    assert_eq!(c.phase(), Some(ItemPhase::RevealFirst));

    assert_eq!(
        c.next_event().await,
        Some(SessionEvent::PhaseChanged {
            index: 0,
            phase: ItemPhase::RevealSecond
        })
    );
    assert!(restarted_at.elapsed() >= Duration::from_millis(1_000));
    assert_eq!(
        h.audio.plays(),
        vec!["audio/1-meaning.mp3".to_string(), "audio/1-meaning.mp3".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn answered_study_item_replays_but_refuses_resubmission() {
    let h = harness(None, slow_ticks());
    let mut c = h.service.start(casa_lesson(), SessionMode::Study).await.unwrap();
    reach_input(&mut c).await;
    c.submit_answer("casa").unwrap();
    c.edit_note(Some("feminine".into())).unwrap();

    c.restart_current().unwrap();
    assert_eq!(c.phase(), Some(ItemPhase::RevealFirst));
    reach_input(&mut c).await;
    assert!(matches!(
        c.submit_answer("caza"),
        Err(SessionError::State(SessionStateError::AlreadyAnswered(_)))
    ));

    let progress = c.current_progress().unwrap();
    assert_eq!(progress.grade(), Grade::Correct);
    assert_eq!(progress.user_note(), Some("feminine"));

    let snapshot = h.snapshots.get(&key(SessionMode::Study)).unwrap().unwrap();
    assert_eq!(snapshot.progress[0].user_note(), Some("feminine"));
}

// ─── Test mode scoring ─────────────────────────────────────────────────────────

#[tokio::test]
async fn clue_levels_cap_points_and_letters() {
    let h = harness(None, slow_ticks());
    let mut c = h.service.start(casa_lesson(), SessionMode::Test).await.unwrap();
    assert_eq!(c.phase(), None);
    assert_eq!(c.hints_remaining(), 2);

    // Scenario A
    let a = c.submit_answer("Casa ").unwrap().progress;
    assert_eq!((a.points_earned(), a.grade(), a.score_letter()), (3, Grade::Correct, ScoreLetter::A));
    c.advance().await.unwrap();

    // Scenario B
    assert_eq!(c.reveal_clue().unwrap().value(), 1);
    assert!(c.hint_visibility().image && !c.hint_visibility().text);
    let b = c.submit_answer("case").unwrap().progress;
    assert_eq!(b.grade(), Grade::HalfCorrect);
    assert_eq!(b.points_earned(), 1);
    assert_eq!(b.score_letter(), ScoreLetter::B);
    c.advance().await.unwrap();

    // Scenario C
    c.reveal_clue().unwrap();
    c.reveal_clue().unwrap();
    assert!(matches!(c.reveal_clue(), Err(SessionError::Clue(ClueError::Exhausted))));
    let f = c.submit_answer("xyz").unwrap().progress;
    assert_eq!((f.points_earned(), f.grade(), f.score_letter()), (0, Grade::Incorrect, ScoreLetter::F));

    let stats = c.stats();
    assert_eq!(stats.items_answered, 3);
    assert_eq!(stats.items_correct, 1);
    assert_eq!(stats.items_half_correct, 1);
    assert_eq!(stats.total_points, 4);
    assert_eq!(stats.max_points, 9);
}

#[tokio::test]
async fn blank_answers_are_rejected_without_side_effects() {
    let h = harness(None, slow_ticks());
    let mut c = h.service.start(casa_lesson(), SessionMode::Test).await.unwrap();
    assert!(matches!(c.submit_answer("   "), Err(SessionError::Answer(_))));
    assert!(c.current_progress().is_none());
    assert_eq!(c.hints_remaining(), 2);
}

#[tokio::test]
async fn locked_item_shows_history_and_refuses_changes() {
    let h = harness(None, slow_ticks());
    let mut c = h.service.start(casa_lesson(), SessionMode::Test).await.unwrap();
    c.reveal_clue().unwrap();
    c.submit_answer("casa").unwrap();
    c.advance().await.unwrap();

    c.jump_to(0).unwrap();
    assert_eq!(c.clue_level().value(), 1);
    assert_eq!(c.hints_remaining(), 0);
    let hint = c.hint_visibility();
    assert!(hint.image && hint.text);
    assert!(matches!(c.submit_answer("casa"), Err(SessionError::Clue(ClueError::Locked))));
    assert!(matches!(c.reveal_clue(), Err(SessionError::Clue(ClueError::Locked))));

    c.restart_current().unwrap();
    assert_eq!(c.clue_level().value(), 1);
    assert_eq!(c.current_progress().unwrap().points_earned(), 2);
}

#[tokio::test]
async fn mode_specific_actions_are_refused_elsewhere() {
    let h = harness(None, slow_ticks());
    let mut test = h.service.start(casa_lesson(), SessionMode::Test).await.unwrap();
    assert!(matches!(
        test.edit_note(Some("x".into())),
        Err(SessionError::WrongMode(SessionMode::Test))
    ));

    let mut study = h.service.start(casa_lesson(), SessionMode::Study).await.unwrap();
    assert!(matches!(study.reveal_clue(), Err(SessionError::WrongMode(SessionMode::Study))));
    assert!(matches!(
        study.edit_note(Some("x".into())),
        Err(SessionError::State(SessionStateError::NoProgress(_)))
    ));
}

// ─── navigation ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn invalid_jump_leaves_the_session_untouched() {
    let h = harness(None, slow_ticks());
    let mut c = h.service.start(casa_lesson(), SessionMode::Test).await.unwrap();
    c.jump_to(2).unwrap();

    assert!(matches!(
        c.jump_to(3),
        Err(SessionError::State(SessionStateError::IndexOutOfRange { index: 3, len: 3 }))
    ));
    assert_eq!(c.current_index(), 2);
    assert_eq!(c.previous().unwrap(), 1);
    c.jump_to(0).unwrap();
    assert!(matches!(c.previous(), Err(SessionError::AtFirstItem)));
}

#[tokio::test]
async fn advancing_marks_departed_items_completed() {
    let h = harness(None, slow_ticks());
    let mut c = h.service.start(casa_lesson(), SessionMode::Test).await.unwrap();

    assert_eq!(c.advance().await.unwrap(), Advance::Moved(1));
    c.jump_to(2).unwrap();
    let completed: Vec<_> = c.state().completed_indices().iter().copied().collect();
    assert_eq!(completed, vec![0]);
}

proptest! {
    #[test]
    fn restart_never_changes_progress(restarts in 0usize..8, clues in 0u8..=2) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            let h = harness(None, slow_ticks());
            let mut c = h.service.start(casa_lesson(), SessionMode::Test).await.unwrap();
            c.submit_answer("case").unwrap();
            c.jump_to(1).unwrap();
            for _ in 0..clues {
                c.reveal_clue().unwrap();
            }
            let before: Vec<_> = c.state().progress().cloned().collect();

            for _ in 0..restarts {
                c.restart_current().unwrap();
            }

            let after: Vec<_> = c.state().progress().cloned().collect();
            assert_eq!(before, after);
            if restarts > 0 {
                assert_eq!(c.clue_level().value(), 0);
            }
        });
    }
}

// ─── persistence ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn reload_resumes_exact_state() {
    let h = harness(Some(UserId::new(Uuid::new_v4())), slow_ticks());
    let mut c = h.service.start(casa_lesson(), SessionMode::Test).await.unwrap();
    c.reveal_clue().unwrap();
    c.submit_answer("case").unwrap();
    c.advance().await.unwrap();
    c.submit_answer("xyz").unwrap();
    c.jump_to(2).unwrap();

    let before = c.state().clone();
    c.close();
    drop(c);

    let resumed = h.service.start(casa_lesson(), SessionMode::Test).await.unwrap();
    assert!(resumed.was_resumed());
    assert_eq!(resumed.session_id(), before.session_id());
    assert_eq!(resumed.current_index(), 2);
    assert_eq!(resumed.state().completed_indices(), before.completed_indices());
    assert_eq!(resumed.state(), &before);
    assert_eq!(resumed.remote_sync(), RemoteSync::RemotePending);
    assert_eq!(h.remote.session_count().unwrap(), 1);
}

#[tokio::test]
async fn remote_create_failure_falls_back_to_local_id() {
    let h = harness(Some(UserId::new(Uuid::new_v4())), slow_ticks());
    h.remote.set_fail_create(true);

    let c = h.service.start(casa_lesson(), SessionMode::Study).await.unwrap();
    assert_eq!(c.session_id().namespace(), "local");
    assert_eq!(c.remote_sync(), RemoteSync::NoRemote);
    let snapshot = h.snapshots.get(&key(SessionMode::Study)).unwrap().unwrap();
    assert_eq!(&snapshot.session_id, c.session_id());

    let guest = harness(None, slow_ticks());
    let g = guest.service.start(casa_lesson(), SessionMode::Study).await.unwrap();
    assert_eq!(g.session_id().namespace(), "guest");
}

#[tokio::test]
async fn finishing_the_last_item_syncs_and_clears_the_snapshot() {
    let h = harness(Some(UserId::new(Uuid::new_v4())), slow_ticks());
    let mut c = h.service.start(casa_lesson(), SessionMode::Test).await.unwrap();
    let id = c.session_id().remote_id().unwrap();

    c.submit_answer("casa").unwrap();
    c.advance().await.unwrap();
    c.advance().await.unwrap();
    let Advance::Completed(report) = c.advance().await.unwrap() else {
        panic!("expected completion");
    };

    assert_eq!(report.outcome, CompletionOutcome::Synced);
    assert_eq!(report.stats.items_answered, 1);
    assert_eq!(report.stats.items_total, 3);
    assert_eq!(c.remote_sync(), RemoteSync::RemoteConfirmed);
    assert!(c.is_completed());
    assert!(h.snapshots.get(&key(SessionMode::Test)).unwrap().is_none());

    let row = h.remote.session(id).unwrap().unwrap();
    let record = row.completion.unwrap();
    assert_eq!(record.items.len(), 1);
    assert_eq!(record.stats, report.stats);

    assert!(c.next_event().await.is_none());
    assert!(matches!(c.submit_answer("casa"), Err(SessionError::Completed)));
    assert!(matches!(c.advance().await, Err(SessionError::Completed)));
}

#[tokio::test]
async fn early_finish_with_failed_remote_keeps_progress() {
    let h = harness(Some(UserId::new(Uuid::new_v4())), slow_ticks());
    let mut c = h.service.start(casa_lesson(), SessionMode::Test).await.unwrap();
    c.submit_answer("casa").unwrap();

    h.remote.set_fail_complete(true);
    let report = c.finish().await.unwrap();
    assert!(!report.is_success());
    assert_eq!(report.stats.total_points, 3);

    let kept = h.snapshots.get(&key(SessionMode::Test)).unwrap().unwrap();
    assert!(kept.completed_at.is_some());
    assert_eq!(kept.progress.len(), 1);

    h.remote.set_fail_complete(false);
    let next = h.service.start(casa_lesson(), SessionMode::Test).await.unwrap();
    assert!(!next.was_resumed());
    let id = report.session_id.remote_id().unwrap();
    assert!(h.remote.session(id).unwrap().unwrap().completion.is_some());
}

// ─── timers ────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn ticks_count_elapsed_seconds_until_close() {
    let settings = SessionSettings::new(1_000, 1_000).unwrap();
    let h = harness(None, settings);
    let mut c = h.service.start(casa_lesson(), SessionMode::Test).await.unwrap();

    for expected in 1..=3 {
        assert_eq!(
            c.next_event().await,
            Some(SessionEvent::Tick {
                elapsed_seconds: expected
            })
        );
    }
    c.close();
    assert!(c.next_event().await.is_none());

    let snapshot = h.snapshots.get(&key(SessionMode::Test)).unwrap().unwrap();
    assert_eq!(snapshot.elapsed_seconds, 3);
    assert!(snapshot.is_resumable());
}

#[tokio::test(start_paused = true)]
async fn sub_second_ticks_accumulate_into_whole_seconds() {
    let settings = SessionSettings::new(1_000, 500).unwrap();
    let h = harness(None, settings);
    let mut c = h.service.start(casa_lesson(), SessionMode::Test).await.unwrap();

    let mut seen = Vec::new();
    for _ in 0..5 {
        match c.next_event().await {
            Some(SessionEvent::Tick { elapsed_seconds }) => seen.push(elapsed_seconds),
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert_eq!(seen, vec![0, 1, 1, 2, 2]);
    c.close();

    let snapshot = h.snapshots.get(&key(SessionMode::Test)).unwrap().unwrap();
    assert_eq!(snapshot.elapsed_seconds, 2);
}

#[tokio::test(start_paused = true)]
async fn long_ticks_count_their_full_length() {
    let h = harness(None, slow_ticks());
    let mut c = h.service.start(casa_lesson(), SessionMode::Test).await.unwrap();
    assert_eq!(
        c.next_event().await,
        Some(SessionEvent::Tick {
            elapsed_seconds: 60
        })
    );
}

#[tokio::test(start_paused = true)]
async fn dropping_the_controller_stops_audio() {
    let h = harness(None, slow_ticks());
    let c = h.service.start(casa_lesson(), SessionMode::Study).await.unwrap();
    let stops = h.audio.stops();
    drop(c);
    assert!(h.audio.stops() > stops);
    assert!(h.snapshots.get(&key(SessionMode::Study)).unwrap().is_some());
}
