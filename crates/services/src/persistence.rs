//! Session Persistence Manager.
//!
//! Every mutation is mirrored into the local snapshot store first. The
//! durable store only sees session creation and completion, and neither can
//! fail the caller. A finished session leaves the local store only once the
//! durable store has confirmed it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use learn_core::Clock;
use learn_core::model::{
    Lesson, LessonId, RemoteSync, SessionId, SessionMode, SessionState, SessionStats,
};
use storage::repository::{
    CompletionRecord, RemoteSessionStore, SessionSnapshot, SnapshotKey, SnapshotStore, Storage,
    StorageError,
};

use crate::error::SessionError;
use crate::identity::IdentityProvider;

//
// ─── COMPLETION REPORT ─────────────────────────────────────────────────────────
//

/// Why a completed session is still held locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetainReason {
    /// `local:` or `guest:` session; kept locally and moved to the outbox
    /// on the next open.
    LocalOnly,
    /// The remote completion write failed; it is retried on the next open.
    RemoteFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// Remote completion acknowledged and local snapshot cleared.
    Synced,
    /// Local snapshot kept.
    Retained(RetainReason),
}

/// Result of completing a session. Results are always available from the
/// in-memory state, whatever happened to the remote write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionReport {
    pub session_id: SessionId,
    pub stats: SessionStats,
    pub completed_at: DateTime<Utc>,
    pub outcome: CompletionOutcome,
}

impl CompletionReport {
    /// True unless a remote completion write failed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        !matches!(self.outcome, CompletionOutcome::Retained(RetainReason::RemoteFailed(_)))
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            CompletionOutcome::Retained(RetainReason::RemoteFailed(e)) => Some(e.as_str()),
            _ => None,
        }
    }
}

/// A session ready to be driven by a controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedSession {
    pub state: SessionState,
    pub sync: RemoteSync,
    pub resumed: bool,
}

enum RetryResult {
    Synced,
    Failed,
    /// The row no longer exists or the snapshot cannot be rebuilt.
    Unrecoverable,
}

enum Delivery {
    Synced,
    Unrecoverable,
    /// Still waiting; carries the snapshot as it should be parked.
    Pending(SessionSnapshot),
}

//
// ─── MANAGER ───────────────────────────────────────────────────────────────────
//

#[derive(Clone)]
pub struct SessionPersistence {
    clock: Clock,
    snapshots: Arc<dyn SnapshotStore>,
    remote: Arc<dyn RemoteSessionStore>,
    identity: Arc<dyn IdentityProvider>,
}

impl SessionPersistence {
    #[must_use]
    pub fn new(clock: Clock, storage: Storage, identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            clock,
            snapshots: storage.snapshots,
            remote: storage.remote,
            identity,
        }
    }

    #[must_use]
    pub fn clock(&self) -> Clock {
        self.clock
    }

    /// Resume the unfinished pass over `lesson`, or start a new one.
    ///
    /// Before deciding, unsynced completions for the same key are retried
    /// and a finished snapshot still holding the pointer is settled.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if a finished snapshot still holds the
    /// pointer and cannot be moved to the outbox, or `SessionError::State`
    /// if a fresh session cannot be built.
    pub async fn open(&self, mode: SessionMode, lesson: &Lesson) -> Result<OpenedSession, SessionError> {
        let key = SnapshotKey::new(mode, lesson.id());
        self.flush_outbox(&key).await;
        self.settle_finished(&key).await?;

        if let Some((state, sync)) = self.resume(mode, lesson) {
            return Ok(OpenedSession {
                state,
                sync,
                resumed: true,
            });
        }

        let started_at = self.clock.now();
        let session_id = self.create_session(mode, lesson.id(), started_at).await;
        let sync = RemoteSync::initial_for(&session_id);
        let state = SessionState::new(session_id, mode, lesson.id(), lesson.item_ids(), started_at)?;
        self.persist(&state, sync);
        tracing::info!(
            session_id = %state.session_id(),
            lesson_id = %lesson.id(),
            %mode,
            "session created"
        );
        Ok(OpenedSession {
            state,
            sync,
            resumed: false,
        })
    }

    /// Rebuild the unfinished session stored for `(mode, lesson)`.
    ///
    /// A snapshot that no longer fits the lesson is discarded.
    #[must_use]
    pub fn resume(&self, mode: SessionMode, lesson: &Lesson) -> Option<(SessionState, RemoteSync)> {
        let key = SnapshotKey::new(mode, lesson.id());
        let snapshot = match self.snapshots.get(&key) {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(%key, error = %e, "snapshot unreadable; starting fresh");
                return None;
            }
        };
        if !snapshot.is_resumable() {
            return None;
        }

        match restore_for(&snapshot, mode, lesson) {
            Ok(state) => {
                tracing::info!(
                    session_id = %state.session_id(),
                    index = state.current_index(),
                    answered = state.progress().count(),
                    "session resumed"
                );
                Some((state, snapshot.remote_sync))
            }
            Err(reason) => {
                tracing::warn!(%key, session_id = %snapshot.session_id, %reason, "stale snapshot discarded");
                self.clear(&key);
                None
            }
        }
    }

    /// Pick an id for a new session: a durable row when possible, a
    /// timestamped local or guest id otherwise.
    pub async fn create_session(
        &self,
        mode: SessionMode,
        lesson_id: LessonId,
        started_at: DateTime<Utc>,
    ) -> SessionId {
        let Some(user_id) = self.identity.current_user() else {
            return SessionId::guest(lesson_id, started_at);
        };
        match self
            .remote
            .create_session(user_id, mode, lesson_id, started_at)
            .await
        {
            Ok(id) => SessionId::Remote(id),
            Err(e) => {
                tracing::warn!(%lesson_id, %mode, error = %e, "remote session create failed; using local id");
                SessionId::local(lesson_id, started_at)
            }
        }
    }

    /// Mirror `state` into the local snapshot. Failures are logged only.
    pub fn persist(&self, state: &SessionState, sync: RemoteSync) {
        let snapshot = SessionSnapshot::capture(state, sync, self.clock.now());
        if let Err(e) = self.snapshots.set(&snapshot.key(), &snapshot) {
            tracing::warn!(session_id = %state.session_id(), error = %e, "snapshot write failed");
        }
    }

    /// Complete `state`: one remote write for `remote:` sessions, then clear
    /// the pointer on success or keep a finished snapshot otherwise.
    pub async fn complete(&self, state: &SessionState, sync: &mut RemoteSync) -> CompletionReport {
        let completed_at = self.clock.now();
        let key = SnapshotKey::new(state.mode(), state.lesson_id());

        let outcome = match CompletionRecord::for_state(state, completed_at) {
            None => {
                *sync = RemoteSync::NoRemote;
                CompletionOutcome::Retained(RetainReason::LocalOnly)
            }
            Some(_) if *sync == RemoteSync::RemoteConfirmed => CompletionOutcome::Synced,
            Some(record) => match self.remote.complete_session(&record).await {
                Ok(()) => {
                    *sync = RemoteSync::RemoteConfirmed;
                    CompletionOutcome::Synced
                }
                Err(e) => {
                    tracing::warn!(session_id = %state.session_id(), error = %e, "remote completion failed; snapshot retained");
                    CompletionOutcome::Retained(RetainReason::RemoteFailed(e.to_string()))
                }
            },
        };

        match &outcome {
            CompletionOutcome::Synced => {
                self.clear(&key);
                tracing::info!(session_id = %state.session_id(), "session completed and synced");
            }
            CompletionOutcome::Retained(_) => {
                let mut snapshot = SessionSnapshot::capture(state, *sync, completed_at);
                snapshot.completed_at = Some(completed_at);
                if let Err(e) = self.snapshots.set(&key, &snapshot) {
                    tracing::warn!(session_id = %state.session_id(), error = %e, "snapshot write failed");
                }
                tracing::info!(session_id = %state.session_id(), "session completed; snapshot retained");
            }
        }

        CompletionReport {
            session_id: state.session_id().clone(),
            stats: state.stats(),
            completed_at,
            outcome,
        }
    }

    // ─── reconciliation ─────────────────────────────────────────────────────

    async fn flush_outbox(&self, key: &SnapshotKey) {
        let parked = match self.snapshots.parked(key) {
            Ok(parked) => parked,
            Err(e) => {
                tracing::warn!(%key, error = %e, "outbox unreadable");
                return;
            }
        };
        for snapshot in parked {
            let parked_id = snapshot.session_id.clone();
            let result = match self.deliver(snapshot).await {
                Delivery::Pending(snapshot) if snapshot.session_id == parked_id => Ok(()),
                Delivery::Pending(promoted) => self
                    .snapshots
                    .park(&promoted)
                    .and_then(|()| self.snapshots.unpark(key, &parked_id)),
                Delivery::Synced | Delivery::Unrecoverable => {
                    self.snapshots.unpark(key, &parked_id)
                }
            };
            if let Err(e) = result {
                tracing::warn!(%key, session_id = %parked_id, error = %e, "outbox write failed");
            }
        }
    }

    /// Free the pointer held by a finished snapshot. Anything not yet in the
    /// durable store moves to the outbox first.
    ///
    /// Returns an error, leaving the pointer in place, if it cannot be parked.
    async fn settle_finished(&self, key: &SnapshotKey) -> Result<(), StorageError> {
        let Ok(Some(snapshot)) = self.snapshots.get(key) else {
            return Ok(());
        };
        if snapshot.is_resumable() {
            return Ok(());
        }

        if let Delivery::Pending(snapshot) = self.deliver(snapshot).await {
            if let Err(e) = self.snapshots.park(&snapshot) {
                tracing::warn!(%key, session_id = %snapshot.session_id, error = %e, "outbox write failed; keeping pointer");
                return Err(e);
            }
            tracing::info!(session_id = %snapshot.session_id, "unsynced completion parked");
        }
        self.clear(key);
        Ok(())
    }

    /// Try to get a finished snapshot into the durable store.
    ///
    /// `local:` sessions are first given a remote row when an identity is
    /// available; `guest:` sessions stay pending.
    async fn deliver(&self, mut snapshot: SessionSnapshot) -> Delivery {
        if let SessionId::Local { .. } = snapshot.session_id {
            let Some(user_id) = self.identity.current_user() else {
                return Delivery::Pending(snapshot);
            };
            match self
                .remote
                .create_session(user_id, snapshot.mode, snapshot.lesson_id, snapshot.started_at)
                .await
            {
                Ok(id) => {
                    tracing::info!(local_id = %snapshot.session_id, remote_id = %id, "local session promoted");
                    snapshot.session_id = SessionId::Remote(id);
                    snapshot.remote_sync = RemoteSync::RemotePending;
                }
                Err(e) => {
                    tracing::warn!(session_id = %snapshot.session_id, error = %e, "remote create retry failed");
                    return Delivery::Pending(snapshot);
                }
            }
        }
        if !snapshot.session_id.is_remote() {
            return Delivery::Pending(snapshot);
        }
        if snapshot.remote_sync == RemoteSync::RemoteConfirmed {
            return Delivery::Synced;
        }

        match self.retry_completion(&snapshot).await {
            RetryResult::Synced => Delivery::Synced,
            RetryResult::Unrecoverable => Delivery::Unrecoverable,
            RetryResult::Failed => Delivery::Pending(snapshot),
        }
    }

    async fn retry_completion(&self, snapshot: &SessionSnapshot) -> RetryResult {
        let completed_at = snapshot.completed_at.unwrap_or(snapshot.updated_at);
        let record = match snapshot.restore() {
            Ok(state) => CompletionRecord::for_state(&state, completed_at),
            Err(e) => {
                tracing::warn!(session_id = %snapshot.session_id, error = %e, "unsynced snapshot cannot be rebuilt; dropping");
                return RetryResult::Unrecoverable;
            }
        };
        let Some(record) = record else {
            return RetryResult::Unrecoverable;
        };

        match self.remote.complete_session(&record).await {
            Ok(()) => {
                tracing::info!(session_id = %snapshot.session_id, "unsynced completion delivered");
                RetryResult::Synced
            }
            Err(StorageError::NotFound) => {
                tracing::warn!(session_id = %snapshot.session_id, "remote row missing; dropping unsynced completion");
                RetryResult::Unrecoverable
            }
            Err(e) => {
                tracing::warn!(session_id = %snapshot.session_id, error = %e, "completion retry failed");
                RetryResult::Failed
            }
        }
    }

    fn clear(&self, key: &SnapshotKey) {
        if let Err(e) = self.snapshots.clear(key) {
            tracing::warn!(%key, error = %e, "snapshot clear failed");
        }
    }
}

fn restore_for(
    snapshot: &SessionSnapshot,
    mode: SessionMode,
    lesson: &Lesson,
) -> Result<SessionState, String> {
    if snapshot.mode != mode || snapshot.lesson_id != lesson.id() {
        return Err("snapshot belongs to another lesson pass".into());
    }
    if snapshot.item_ids != lesson.item_ids() {
        return Err("lesson items changed".into());
    }
    snapshot.restore().map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::StaticIdentity;
    use learn_core::model::{Item, ItemId, ItemProgress, UserId};
    use learn_core::scoring::{ClueLevel, score};
    use chrono::Duration;
    use learn_core::time::fixed_clock;
    use storage::repository::{InMemoryRemoteStore, InMemorySnapshotStore};
    use uuid::Uuid;

    fn lesson() -> Lesson {
        let items = vec![
            Item::new(ItemId::new(1), "house", ["casa"]).unwrap(),
            Item::new(ItemId::new(2), "dog", ["perro"]).unwrap(),
        ];
        Lesson::new(LessonId::new(9), "Basics", items).unwrap()
    }

    fn persistence(
        remote: &InMemoryRemoteStore,
        snapshots: &InMemorySnapshotStore,
        user: Option<UserId>,
    ) -> SessionPersistence {
        persistence_with(fixed_clock(), Arc::new(snapshots.clone()), remote, user)
    }

    fn persistence_with(
        clock: Clock,
        snapshots: Arc<dyn SnapshotStore>,
        remote: &InMemoryRemoteStore,
        user: Option<UserId>,
    ) -> SessionPersistence {
        let storage = Storage {
            snapshots,
            remote: Arc::new(remote.clone()),
        };
        let identity = user.map_or_else(StaticIdentity::guest, StaticIdentity::user);
        SessionPersistence::new(clock, storage, Arc::new(identity))
    }

    /// Snapshot store whose outbox rejects writes.
    struct OutboxFull(InMemorySnapshotStore);

    impl SnapshotStore for OutboxFull {
        fn get(&self, key: &SnapshotKey) -> Result<Option<SessionSnapshot>, StorageError> {
            self.0.get(key)
        }

        fn set(&self, key: &SnapshotKey, snapshot: &SessionSnapshot) -> Result<(), StorageError> {
            self.0.set(key, snapshot)
        }

        fn clear(&self, key: &SnapshotKey) -> Result<(), StorageError> {
            self.0.clear(key)
        }

        fn park(&self, _snapshot: &SessionSnapshot) -> Result<(), StorageError> {
            Err(StorageError::Io("outbox full".into()))
        }

        fn parked(&self, key: &SnapshotKey) -> Result<Vec<SessionSnapshot>, StorageError> {
            self.0.parked(key)
        }

        fn unpark(&self, key: &SnapshotKey, session_id: &SessionId) -> Result<(), StorageError> {
            self.0.unpark(key, session_id)
        }
    }

    fn answer_first(state: &mut SessionState) {
        let level = ClueLevel::NONE;
        state
            .record_answer(ItemProgress::new(ItemId::new(1), "casa", level, &score(level, 0)))
            .unwrap();
    }

    #[tokio::test]
    async fn guest_sessions_never_touch_the_remote_store() {
        let remote = InMemoryRemoteStore::new();
        let snapshots = InMemorySnapshotStore::new();
        let manager = persistence(&remote, &snapshots, None);

        let opened = manager.open(SessionMode::Study, &lesson()).await.unwrap();
        assert_eq!(opened.state.session_id().namespace(), "guest");
        assert_eq!(opened.sync, RemoteSync::NoRemote);
        assert_eq!(remote.session_count().unwrap(), 0);

        let key = SnapshotKey::new(SessionMode::Study, LessonId::new(9));
        assert!(snapshots.get(&key).unwrap().is_some());
    }

    #[tokio::test]
    async fn snapshot_for_changed_lesson_is_discarded() {
        let remote = InMemoryRemoteStore::new();
        let snapshots = InMemorySnapshotStore::new();
        let manager = persistence(&remote, &snapshots, None);
        manager.open(SessionMode::Test, &lesson()).await.unwrap();

        let items = vec![Item::new(ItemId::new(3), "cat", ["gato"]).unwrap()];
        let changed = Lesson::new(LessonId::new(9), "Basics", items).unwrap();
        assert!(manager.resume(SessionMode::Test, &changed).is_none());

        let again = manager.open(SessionMode::Test, &changed).await.unwrap();
        assert!(!again.resumed);
        assert_eq!(again.state.item_ids(), &[ItemId::new(3)]);
    }

    #[tokio::test]
    async fn failed_completion_is_retried_on_next_open() {
        let remote = InMemoryRemoteStore::new();
        let snapshots = InMemorySnapshotStore::new();
        let manager = persistence(&remote, &snapshots, Some(UserId::new(Uuid::new_v4())));
        let lesson = lesson();

        let OpenedSession { mut state, mut sync, .. } =
            manager.open(SessionMode::Test, &lesson).await.unwrap();
        answer_first(&mut state);
        let id = state.session_id().remote_id().unwrap();

        remote.set_fail_complete(true);
        let report = manager.complete(&state, &mut sync).await;
        assert!(!report.is_success());
        assert!(report.error().is_some());
        assert_eq!(sync, RemoteSync::RemotePending);

        let key = SnapshotKey::new(SessionMode::Test, lesson.id());
        let kept = snapshots.get(&key).unwrap().unwrap();
        assert!(!kept.is_resumable());

        remote.set_fail_complete(false);
        let next = manager.open(SessionMode::Test, &lesson).await.unwrap();
        assert!(!next.resumed);
        assert_ne!(next.state.session_id(), state.session_id());

        let row = remote.session(id).unwrap().unwrap();
        assert_eq!(row.completion.unwrap().stats.items_answered, 1);
        assert!(snapshots.parked(&key).unwrap().is_empty());
    }

    #[tokio::test]
    async fn repeated_failure_parks_and_frees_the_pointer() {
        let remote = InMemoryRemoteStore::new();
        let snapshots = InMemorySnapshotStore::new();
        let manager = persistence(&remote, &snapshots, Some(UserId::new(Uuid::new_v4())));
        let lesson = lesson();
        let key = SnapshotKey::new(SessionMode::Test, lesson.id());

        let OpenedSession { state, mut sync, .. } =
            manager.open(SessionMode::Test, &lesson).await.unwrap();
        remote.set_fail_complete(true);
        manager.complete(&state, &mut sync).await;

        let next = manager.open(SessionMode::Test, &lesson).await.unwrap();
        assert!(!next.resumed);
        assert_eq!(snapshots.parked(&key).unwrap().len(), 1);
        assert_eq!(remote.complete_calls(), 2);

        remote.set_fail_complete(false);
        manager.open(SessionMode::Test, &lesson).await.unwrap();
        assert!(snapshots.parked(&key).unwrap().is_empty());
        let id = state.session_id().remote_id().unwrap();
        assert!(remote.session(id).unwrap().unwrap().completion.is_some());
    }

    #[tokio::test]
    async fn finished_guest_snapshot_is_parked_on_next_open() {
        let remote = InMemoryRemoteStore::new();
        let snapshots = InMemorySnapshotStore::new();
        let lesson = lesson();
        let key = SnapshotKey::new(SessionMode::Study, lesson.id());

        let first = persistence(&remote, &snapshots, None);
        let OpenedSession { mut state, mut sync, .. } =
            first.open(SessionMode::Study, &lesson).await.unwrap();
        answer_first(&mut state);
        let report = first.complete(&state, &mut sync).await;
        assert!(report.is_success());
        assert_eq!(
            report.outcome,
            CompletionOutcome::Retained(RetainReason::LocalOnly)
        );

        let later = persistence_with(
            fixed_clock().shifted(Duration::minutes(5)),
            Arc::new(snapshots.clone()),
            &remote,
            None,
        );
        let next = later.open(SessionMode::Study, &lesson).await.unwrap();
        assert!(!next.resumed);
        assert_ne!(next.state.session_id(), state.session_id());

        let parked = snapshots.parked(&key).unwrap();
        assert_eq!(parked.len(), 1);
        assert_eq!(&parked[0].session_id, state.session_id());
        assert_eq!(parked[0].restore().unwrap().stats().items_answered, 1);
        assert_eq!(remote.complete_calls(), 0);

        let OpenedSession { state: second, mut sync, .. } = next;
        later.complete(&second, &mut sync).await;
        let third = persistence_with(
            fixed_clock().shifted(Duration::minutes(10)),
            Arc::new(snapshots.clone()),
            &remote,
            None,
        );
        third.open(SessionMode::Study, &lesson).await.unwrap();
        assert_eq!(snapshots.parked(&key).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn finished_local_session_is_promoted_once_the_remote_is_back() {
        let remote = InMemoryRemoteStore::new();
        let snapshots = InMemorySnapshotStore::new();
        let manager = persistence(&remote, &snapshots, Some(UserId::new(Uuid::new_v4())));
        let lesson = lesson();
        let key = SnapshotKey::new(SessionMode::Test, lesson.id());

        remote.set_fail_create(true);
        let OpenedSession { mut state, mut sync, .. } =
            manager.open(SessionMode::Test, &lesson).await.unwrap();
        assert_eq!(state.session_id().namespace(), "local");
        answer_first(&mut state);
        let report = manager.complete(&state, &mut sync).await;
        assert_eq!(
            report.outcome,
            CompletionOutcome::Retained(RetainReason::LocalOnly)
        );

        // Remote still down: the finished session waits in the outbox.
        manager.open(SessionMode::Test, &lesson).await.unwrap();
        let parked = snapshots.parked(&key).unwrap();
        assert_eq!(parked.len(), 1);
        assert_eq!(&parked[0].session_id, state.session_id());
        assert!(remote.completed_sessions().unwrap().is_empty());

        remote.set_fail_create(false);
        manager.open(SessionMode::Test, &lesson).await.unwrap();
        assert!(snapshots.parked(&key).unwrap().is_empty());

        let completed = remote.completed_sessions().unwrap();
        assert_eq!(completed.len(), 1);
        let record = completed[0].completion.as_ref().unwrap();
        assert_eq!(record.stats.items_answered, 1);
        assert_eq!(record.items.len(), 1);
        assert_eq!(completed[0].started_at, state.started_at());
    }

    #[tokio::test]
    async fn promoted_session_whose_completion_fails_stays_parked_under_its_remote_id() {
        let remote = InMemoryRemoteStore::new();
        let snapshots = InMemorySnapshotStore::new();
        let manager = persistence(&remote, &snapshots, Some(UserId::new(Uuid::new_v4())));
        let lesson = lesson();
        let key = SnapshotKey::new(SessionMode::Test, lesson.id());

        remote.set_fail_create(true);
        let OpenedSession { mut state, mut sync, .. } =
            manager.open(SessionMode::Test, &lesson).await.unwrap();
        answer_first(&mut state);
        manager.complete(&state, &mut sync).await;

        remote.set_fail_create(false);
        remote.set_fail_complete(true);
        manager.open(SessionMode::Test, &lesson).await.unwrap();
        let parked = snapshots.parked(&key).unwrap();
        assert_eq!(parked.len(), 1);
        assert!(parked[0].session_id.is_remote());
        assert_eq!(parked[0].remote_sync, RemoteSync::RemotePending);

        remote.set_fail_complete(false);
        manager.open(SessionMode::Test, &lesson).await.unwrap();
        assert!(snapshots.parked(&key).unwrap().is_empty());
        assert_eq!(remote.completed_sessions().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn open_refuses_to_overwrite_an_unparkable_completion() {
        let remote = InMemoryRemoteStore::new();
        let inner = InMemorySnapshotStore::new();
        let manager = persistence_with(
            fixed_clock(),
            Arc::new(OutboxFull(inner.clone())),
            &remote,
            Some(UserId::new(Uuid::new_v4())),
        );
        let lesson = lesson();
        let key = SnapshotKey::new(SessionMode::Test, lesson.id());

        let OpenedSession { mut state, mut sync, .. } =
            manager.open(SessionMode::Test, &lesson).await.unwrap();
        answer_first(&mut state);
        remote.set_fail_complete(true);
        manager.complete(&state, &mut sync).await;

        let reopened = manager.open(SessionMode::Test, &lesson).await;
        assert!(matches!(reopened, Err(SessionError::Storage(_))));

        let held = inner.get(&key).unwrap().unwrap();
        assert_eq!(&held.session_id, state.session_id());
        assert!(!held.is_resumable());
        assert_eq!(held.remote_sync, RemoteSync::RemotePending);

        remote.set_fail_complete(false);
        let next = manager.open(SessionMode::Test, &lesson).await.unwrap();
        assert_ne!(next.state.session_id(), state.session_id());
        let id = state.session_id().remote_id().unwrap();
        assert!(remote.session(id).unwrap().unwrap().completion.is_some());
    }
}
