use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use uuid::Uuid;

use crate::model::ids::{ItemId, LessonId};
use crate::model::progress::{ItemProgress, SessionMode};
use crate::scoring::{Grade, MAX_POINTS_PER_ITEM, percent};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionStateError {
    #[error("session has no items")]
    EmptySession,

    #[error("index {index} is out of range for {len} items")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("item {0} is not part of this session")]
    UnknownItem(ItemId),

    #[error("item {0} appears more than once")]
    DuplicateItem(ItemId),

    #[error("item {0} has already been answered")]
    AlreadyAnswered(ItemId),

    #[error("item {0} has no recorded answer")]
    NoProgress(ItemId),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid session id: {raw}")]
pub struct SessionIdError {
    raw: String,
}

//
// ─── SESSION ID ────────────────────────────────────────────────────────────────
//

/// Namespaced session identifier.
///
/// Only `Remote` ids are ever reconciled with the durable store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SessionId {
    /// A durable-store row exists.
    Remote(Uuid),
    /// Authenticated learner whose remote create failed.
    Local { lesson_id: LessonId, created_ms: i64 },
    /// No authenticated identity.
    Guest { lesson_id: LessonId, created_ms: i64 },
}

impl SessionId {
    #[must_use]
    pub fn local(lesson_id: LessonId, at: DateTime<Utc>) -> Self {
        Self::Local {
            lesson_id,
            created_ms: at.timestamp_millis(),
        }
    }

    #[must_use]
    pub fn guest(lesson_id: LessonId, at: DateTime<Utc>) -> Self {
        Self::Guest {
            lesson_id,
            created_ms: at.timestamp_millis(),
        }
    }

    #[must_use]
    pub fn namespace(&self) -> &'static str {
        match self {
            Self::Remote(_) => "remote",
            Self::Local { .. } => "local",
            Self::Guest { .. } => "guest",
        }
    }

    #[must_use]
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }

    #[must_use]
    pub fn remote_id(&self) -> Option<Uuid> {
        match self {
            Self::Remote(id) => Some(*id),
            _ => None,
        }
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote(id) => write!(f, "remote:{id}"),
            Self::Local {
                lesson_id,
                created_ms,
            } => write!(f, "local:{lesson_id}:{created_ms}"),
            Self::Guest {
                lesson_id,
                created_ms,
            } => write!(f, "guest:{lesson_id}:{created_ms}"),
        }
    }
}

impl FromStr for SessionId {
    type Err = SessionIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || SessionIdError { raw: s.to_owned() };
        let (namespace, rest) = s.split_once(':').ok_or_else(err)?;

        if namespace == "remote" {
            return Uuid::parse_str(rest).map(Self::Remote).map_err(|_| err());
        }

        let (lesson, created) = rest.split_once(':').ok_or_else(err)?;
        let lesson_id: LessonId = lesson.parse().map_err(|_| err())?;
        let created_ms: i64 = created.parse().map_err(|_| err())?;
        match namespace {
            "local" => Ok(Self::Local {
                lesson_id,
                created_ms,
            }),
            "guest" => Ok(Self::Guest {
                lesson_id,
                created_ms,
            }),
            _ => Err(err()),
        }
    }
}

impl Serialize for SessionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SessionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

//
// ─── REMOTE SYNC ───────────────────────────────────────────────────────────────
//

/// Reconciliation state between the local snapshot and the durable store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteSync {
    /// `local:` or `guest:` session; never reconciled.
    NoRemote,
    /// Remote row exists; completion not yet confirmed.
    RemotePending,
    /// Remote completion write acknowledged.
    RemoteConfirmed,
}

impl RemoteSync {
    #[must_use]
    pub fn initial_for(session_id: &SessionId) -> Self {
        if session_id.is_remote() {
            Self::RemotePending
        } else {
            Self::NoRemote
        }
    }
}

//
// ─── STATS ─────────────────────────────────────────────────────────────────────
//

/// Aggregate figures shown when a session ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    pub items_total: u32,
    pub items_answered: u32,
    pub items_correct: u32,
    pub items_half_correct: u32,
    pub total_points: u32,
    pub max_points: u32,
    pub elapsed_seconds: u64,
}

impl SessionStats {
    #[must_use]
    pub fn percent(&self) -> u32 {
        percent(self.total_points, self.max_points)
    }
}

//
// ─── SESSION STATE ─────────────────────────────────────────────────────────────
//

/// Mutable state of one Study or Test pass.
///
/// Invariants: `current_index < item_ids.len()`, every completed index is in
/// range, and every progress entry belongs to an item of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    session_id: SessionId,
    mode: SessionMode,
    lesson_id: LessonId,
    item_ids: Vec<ItemId>,
    current_index: usize,
    progress: BTreeMap<ItemId, ItemProgress>,
    completed_indices: BTreeSet<usize>,
    elapsed_seconds: u64,
    started_at: DateTime<Utc>,
}

impl SessionState {
    /// Start a fresh session at the first item.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::EmptySession` or `DuplicateItem`.
    pub fn new(
        session_id: SessionId,
        mode: SessionMode,
        lesson_id: LessonId,
        item_ids: Vec<ItemId>,
        started_at: DateTime<Utc>,
    ) -> Result<Self, SessionStateError> {
        Self::from_parts(
            session_id,
            mode,
            lesson_id,
            item_ids,
            0,
            Vec::new(),
            BTreeSet::new(),
            0,
            started_at,
        )
    }

    /// Rebuild a session from persisted parts, checking every invariant.
    ///
    /// # Errors
    ///
    /// Returns a `SessionStateError` describing the first violated invariant.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        session_id: SessionId,
        mode: SessionMode,
        lesson_id: LessonId,
        item_ids: Vec<ItemId>,
        current_index: usize,
        progress: Vec<ItemProgress>,
        completed_indices: BTreeSet<usize>,
        elapsed_seconds: u64,
        started_at: DateTime<Utc>,
    ) -> Result<Self, SessionStateError> {
        let len = item_ids.len();
        if len == 0 {
            return Err(SessionStateError::EmptySession);
        }

        let mut seen = HashSet::with_capacity(len);
        for id in &item_ids {
            if !seen.insert(*id) {
                return Err(SessionStateError::DuplicateItem(*id));
            }
        }

        if current_index >= len {
            return Err(SessionStateError::IndexOutOfRange {
                index: current_index,
                len,
            });
        }
        if let Some(&index) = completed_indices.iter().find(|&&i| i >= len) {
            return Err(SessionStateError::IndexOutOfRange { index, len });
        }

        let mut by_item = BTreeMap::new();
        for entry in progress {
            let id = entry.item_id();
            if !seen.contains(&id) {
                return Err(SessionStateError::UnknownItem(id));
            }
            if by_item.insert(id, entry).is_some() {
                return Err(SessionStateError::AlreadyAnswered(id));
            }
        }

        Ok(Self {
            session_id,
            mode,
            lesson_id,
            item_ids,
            current_index,
            progress: by_item,
            completed_indices,
            elapsed_seconds,
            started_at,
        })
    }

    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    #[must_use]
    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    #[must_use]
    pub fn lesson_id(&self) -> LessonId {
        self.lesson_id
    }

    #[must_use]
    pub fn item_ids(&self) -> &[ItemId] {
        &self.item_ids
    }

    #[must_use]
    pub fn item_count(&self) -> usize {
        self.item_ids.len()
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    #[must_use]
    pub fn current_item_id(&self) -> ItemId {
        self.item_ids[self.current_index]
    }

    #[must_use]
    pub fn is_last_index(&self) -> bool {
        self.current_index + 1 == self.item_ids.len()
    }

    #[must_use]
    pub fn progress_for(&self, item_id: ItemId) -> Option<&ItemProgress> {
        self.progress.get(&item_id)
    }

    /// Progress entries in item order.
    pub fn progress(&self) -> impl Iterator<Item = &ItemProgress> + '_ {
        self.item_ids.iter().filter_map(|id| self.progress.get(id))
    }

    #[must_use]
    pub fn completed_indices(&self) -> &BTreeSet<usize> {
        &self.completed_indices
    }

    #[must_use]
    pub fn is_index_completed(&self, index: usize) -> bool {
        self.completed_indices.contains(&index)
    }

    #[must_use]
    pub fn elapsed_seconds(&self) -> u64 {
        self.elapsed_seconds
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Store the first answer for an item.
    ///
    /// # Errors
    ///
    /// Returns `UnknownItem` or `AlreadyAnswered`.
    pub fn record_answer(&mut self, progress: ItemProgress) -> Result<&ItemProgress, SessionStateError> {
        let id = progress.item_id();
        if !self.item_ids.contains(&id) {
            return Err(SessionStateError::UnknownItem(id));
        }
        if self.progress.contains_key(&id) {
            return Err(SessionStateError::AlreadyAnswered(id));
        }
        Ok(self.progress.entry(id).or_insert(progress))
    }

    /// # Errors
    ///
    /// Returns `NoProgress` if the item has not been answered.
    pub fn set_note(&mut self, item_id: ItemId, note: Option<String>) -> Result<(), SessionStateError> {
        let entry = self
            .progress
            .get_mut(&item_id)
            .ok_or(SessionStateError::NoProgress(item_id))?;
        entry.set_note(note);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `IndexOutOfRange` without touching the state.
    pub fn set_current_index(&mut self, index: usize) -> Result<(), SessionStateError> {
        self.check_index(index)?;
        self.current_index = index;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `IndexOutOfRange` without touching the state.
    pub fn mark_completed(&mut self, index: usize) -> Result<(), SessionStateError> {
        self.check_index(index)?;
        self.completed_indices.insert(index);
        Ok(())
    }

    pub fn add_elapsed(&mut self, seconds: u64) {
        self.elapsed_seconds = self.elapsed_seconds.saturating_add(seconds);
    }

    #[must_use]
    pub fn stats(&self) -> SessionStats {
        let mut stats = SessionStats {
            items_total: count_u32(self.item_ids.len()),
            max_points: count_u32(self.item_ids.len()).saturating_mul(MAX_POINTS_PER_ITEM),
            elapsed_seconds: self.elapsed_seconds,
            ..SessionStats::default()
        };
        for progress in self.progress.values() {
            stats.items_answered += 1;
            match progress.grade() {
                Grade::Correct => stats.items_correct += 1,
                Grade::HalfCorrect => stats.items_half_correct += 1,
                Grade::Incorrect => {}
            }
            stats.total_points = stats.total_points.saturating_add(progress.points_earned());
        }
        stats
    }

    fn check_index(&self, index: usize) -> Result<(), SessionStateError> {
        let len = self.item_ids.len();
        if index >= len {
            return Err(SessionStateError::IndexOutOfRange { index, len });
        }
        Ok(())
    }
}

fn count_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}
