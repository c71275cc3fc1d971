use async_trait::async_trait;
use chrono::{DateTime, Utc};
use learn_core::model::{
    ItemId, ItemProgress, LessonId, RemoteSync, SessionId, SessionMode, SessionState,
    SessionStats, UserId,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("io error: {0}")]
    Io(String),
}

//
// ─── SNAPSHOT ──────────────────────────────────────────────────────────────────
//

/// Current on-disk layout of [`SessionSnapshot`].
pub const SNAPSHOT_VERSION: u32 = 1;

/// Pointer under which the active snapshot of a lesson pass is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SnapshotKey {
    pub mode: SessionMode,
    pub lesson_id: LessonId,
}

impl SnapshotKey {
    #[must_use]
    pub fn new(mode: SessionMode, lesson_id: LessonId) -> Self {
        Self { mode, lesson_id }
    }
}

impl fmt::Display for SnapshotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.mode, self.lesson_id)
    }
}

/// Self-contained serialized form of a `SessionState`.
///
/// A snapshot alone is enough to rebuild an equivalent session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub version: u32,
    pub session_id: SessionId,
    pub mode: SessionMode,
    pub lesson_id: LessonId,
    pub item_ids: Vec<ItemId>,
    pub current_index: usize,
    pub completed_indices: BTreeSet<usize>,
    pub progress: Vec<ItemProgress>,
    pub elapsed_seconds: u64,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub remote_sync: RemoteSync,
}

impl SessionSnapshot {
    #[must_use]
    pub fn capture(state: &SessionState, remote_sync: RemoteSync, updated_at: DateTime<Utc>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            session_id: state.session_id().clone(),
            mode: state.mode(),
            lesson_id: state.lesson_id(),
            item_ids: state.item_ids().to_vec(),
            current_index: state.current_index(),
            completed_indices: state.completed_indices().clone(),
            progress: state.progress().cloned().collect(),
            elapsed_seconds: state.elapsed_seconds(),
            started_at: state.started_at(),
            updated_at,
            completed_at: None,
            remote_sync,
        }
    }

    #[must_use]
    pub fn key(&self) -> SnapshotKey {
        SnapshotKey::new(self.mode, self.lesson_id)
    }

    /// Only unfinished snapshots are resumed.
    #[must_use]
    pub fn is_resumable(&self) -> bool {
        self.completed_at.is_none()
    }

    /// Rebuild the session, re-checking every invariant.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Serialization` for unknown versions or invalid state.
    pub fn restore(&self) -> Result<SessionState, StorageError> {
        if self.version != SNAPSHOT_VERSION {
            return Err(StorageError::Serialization(format!(
                "unsupported snapshot version {}",
                self.version
            )));
        }
        SessionState::from_parts(
            self.session_id.clone(),
            self.mode,
            self.lesson_id,
            self.item_ids.clone(),
            self.current_index,
            self.progress.clone(),
            self.completed_indices.clone(),
            self.elapsed_seconds,
            self.started_at,
        )
        .map_err(|e| StorageError::Serialization(e.to_string()))
    }
}

/// Local, synchronous snapshot store (one active pointer per key plus an
/// outbox of completed sessions still waiting for their remote write).
pub trait SnapshotStore: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be read.
    fn get(&self, key: &SnapshotKey) -> Result<Option<SessionSnapshot>, StorageError>;

    /// Replace the active snapshot for `key` (last writer wins).
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the snapshot cannot be written.
    fn set(&self, key: &SnapshotKey, snapshot: &SessionSnapshot) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the pointer cannot be removed.
    fn clear(&self, key: &SnapshotKey) -> Result<(), StorageError>;

    /// Move a completed, unsynced snapshot into the outbox for its key.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the outbox cannot be written.
    fn park(&self, snapshot: &SessionSnapshot) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the outbox cannot be read.
    fn parked(&self, key: &SnapshotKey) -> Result<Vec<SessionSnapshot>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the outbox cannot be written.
    fn unpark(&self, key: &SnapshotKey, session_id: &SessionId) -> Result<(), StorageError>;
}

//
// ─── REMOTE ────────────────────────────────────────────────────────────────────
//

/// Payload of the one remote completion write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRecord {
    pub session_id: Uuid,
    pub lesson_id: LessonId,
    pub mode: SessionMode,
    pub stats: SessionStats,
    pub items: Vec<ItemProgress>,
    pub completed_at: DateTime<Utc>,
}

impl CompletionRecord {
    /// `None` unless the session lives in the `remote:` namespace.
    #[must_use]
    pub fn for_state(state: &SessionState, completed_at: DateTime<Utc>) -> Option<Self> {
        let session_id = state.session_id().remote_id()?;
        Some(Self {
            session_id,
            lesson_id: state.lesson_id(),
            mode: state.mode(),
            stats: state.stats(),
            items: state.progress().cloned().collect(),
            completed_at,
        })
    }
}

/// Durable, best-effort store of session rows.
#[async_trait]
pub trait RemoteSessionStore: Send + Sync {
    /// Create a session row and return its id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` when the row cannot be created.
    async fn create_session(
        &self,
        user_id: UserId,
        mode: SessionMode,
        lesson_id: LessonId,
        started_at: DateTime<Utc>,
    ) -> Result<Uuid, StorageError>;

    /// Record the aggregate and per-item results. Completing twice succeeds.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` for an unknown session or other
    /// storage errors.
    async fn complete_session(&self, record: &CompletionRecord) -> Result<(), StorageError>;
}

//
// ─── IN-MEMORY ADAPTERS ────────────────────────────────────────────────────────
//

/// Simple in-memory snapshot store for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemorySnapshotStore {
    active: Arc<Mutex<HashMap<SnapshotKey, SessionSnapshot>>>,
    outbox: Arc<Mutex<HashMap<SnapshotKey, Vec<SessionSnapshot>>>>,
}

impl InMemorySnapshotStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<E: fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

impl SnapshotStore for InMemorySnapshotStore {
    fn get(&self, key: &SnapshotKey) -> Result<Option<SessionSnapshot>, StorageError> {
        let guard = self.active.lock().map_err(poisoned)?;
        Ok(guard.get(key).cloned())
    }

    fn set(&self, key: &SnapshotKey, snapshot: &SessionSnapshot) -> Result<(), StorageError> {
        let mut guard = self.active.lock().map_err(poisoned)?;
        guard.insert(*key, snapshot.clone());
        Ok(())
    }

    fn clear(&self, key: &SnapshotKey) -> Result<(), StorageError> {
        let mut guard = self.active.lock().map_err(poisoned)?;
        guard.remove(key);
        Ok(())
    }

    fn park(&self, snapshot: &SessionSnapshot) -> Result<(), StorageError> {
        let mut guard = self.outbox.lock().map_err(poisoned)?;
        let entries = guard.entry(snapshot.key()).or_default();
        entries.retain(|s| s.session_id != snapshot.session_id);
        entries.push(snapshot.clone());
        Ok(())
    }

    fn parked(&self, key: &SnapshotKey) -> Result<Vec<SessionSnapshot>, StorageError> {
        let guard = self.outbox.lock().map_err(poisoned)?;
        Ok(guard.get(key).cloned().unwrap_or_default())
    }

    fn unpark(&self, key: &SnapshotKey, session_id: &SessionId) -> Result<(), StorageError> {
        let mut guard = self.outbox.lock().map_err(poisoned)?;
        if let Some(entries) = guard.get_mut(key) {
            entries.retain(|s| &s.session_id != session_id);
            if entries.is_empty() {
                guard.remove(key);
            }
        }
        Ok(())
    }
}

/// Row kept by [`InMemoryRemoteStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSessionRow {
    pub id: Uuid,
    pub user_id: UserId,
    pub mode: SessionMode,
    pub lesson_id: LessonId,
    pub started_at: DateTime<Utc>,
    pub completion: Option<CompletionRecord>,
}

/// In-memory durable store with switchable failures.
#[derive(Clone, Default)]
pub struct InMemoryRemoteStore {
    sessions: Arc<Mutex<HashMap<Uuid, RemoteSessionRow>>>,
    fail_create: Arc<AtomicBool>,
    fail_complete: Arc<AtomicBool>,
    complete_calls: Arc<AtomicUsize>,
}

impl InMemoryRemoteStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_complete(&self, fail: bool) {
        self.fail_complete.store(fail, Ordering::SeqCst);
    }

    /// Number of completion attempts, including failed ones.
    #[must_use]
    pub fn complete_calls(&self) -> usize {
        self.complete_calls.load(Ordering::SeqCst)
    }

    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn session(&self, id: Uuid) -> Result<Option<RemoteSessionRow>, StorageError> {
        let guard = self.sessions.lock().map_err(poisoned)?;
        Ok(guard.get(&id).cloned())
    }

    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn session_count(&self) -> Result<usize, StorageError> {
        let guard = self.sessions.lock().map_err(poisoned)?;
        Ok(guard.len())
    }

    /// Rows that received a completion write.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn completed_sessions(&self) -> Result<Vec<RemoteSessionRow>, StorageError> {
        let guard = self.sessions.lock().map_err(poisoned)?;
        Ok(guard
            .values()
            .filter(|row| row.completion.is_some())
            .cloned()
            .collect())
    }
}

#[async_trait]
impl RemoteSessionStore for InMemoryRemoteStore {
    async fn create_session(
        &self,
        user_id: UserId,
        mode: SessionMode,
        lesson_id: LessonId,
        started_at: DateTime<Utc>,
    ) -> Result<Uuid, StorageError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(StorageError::Connection("remote store unavailable".into()));
        }
        let id = Uuid::new_v4();
        let mut guard = self.sessions.lock().map_err(poisoned)?;
        guard.insert(
            id,
            RemoteSessionRow {
                id,
                user_id,
                mode,
                lesson_id,
                started_at,
                completion: None,
            },
        );
        Ok(id)
    }

    async fn complete_session(&self, record: &CompletionRecord) -> Result<(), StorageError> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_complete.load(Ordering::SeqCst) {
            return Err(StorageError::Connection("remote store unavailable".into()));
        }
        let mut guard = self.sessions.lock().map_err(poisoned)?;
        let row = guard.get_mut(&record.session_id).ok_or(StorageError::NotFound)?;
        if row.completion.is_none() {
            row.completion = Some(record.clone());
        }
        Ok(())
    }
}

/// Durable store stand-in for offline runs: every call fails fast.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableRemoteStore;

#[async_trait]
impl RemoteSessionStore for UnavailableRemoteStore {
    async fn create_session(
        &self,
        _user_id: UserId,
        _mode: SessionMode,
        _lesson_id: LessonId,
        _started_at: DateTime<Utc>,
    ) -> Result<Uuid, StorageError> {
        Err(StorageError::Connection("offline".into()))
    }

    async fn complete_session(&self, _record: &CompletionRecord) -> Result<(), StorageError> {
        Err(StorageError::Connection("offline".into()))
    }
}

/// Aggregates the local and durable stores behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub snapshots: Arc<dyn SnapshotStore>,
    pub remote: Arc<dyn RemoteSessionStore>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            snapshots: Arc::new(InMemorySnapshotStore::new()),
            remote: Arc::new(InMemoryRemoteStore::new()),
        }
    }
}
