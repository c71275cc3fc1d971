//! JSON-file snapshot store.
//!
//! One `<mode>-<lesson>.json` file holds the active snapshot of a lesson
//! pass and `<mode>-<lesson>.parked.json` holds its unsynced completions.
//! Writes go to a temporary file that is renamed into place.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use learn_core::model::SessionId;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::repository::{SessionSnapshot, SnapshotKey, SnapshotStore, StorageError};

fn io<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Io(e.to_string())
}

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

#[derive(Debug)]
pub struct FileSnapshotStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileSnapshotStore {
    /// Open (and create if needed) a snapshot directory.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the directory cannot be created.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(io)?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn active_path(&self, key: &SnapshotKey) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    fn parked_path(&self, key: &SnapshotKey) -> PathBuf {
        self.dir.join(format!("{key}.parked.json"))
    }

    fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StorageError> {
        match fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map(Some).map_err(ser),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io(e)),
        }
    }

    fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec_pretty(value).map_err(ser)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, bytes).map_err(io)?;
        fs::rename(&tmp, path).map_err(io)
    }

    fn remove(path: &Path) -> Result<(), StorageError> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io(e)),
        }
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn get(&self, key: &SnapshotKey) -> Result<Option<SessionSnapshot>, StorageError> {
        Self::read_json(&self.active_path(key))
    }

    fn set(&self, key: &SnapshotKey, snapshot: &SessionSnapshot) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().map_err(io)?;
        Self::write_json(&self.active_path(key), snapshot)
    }

    fn clear(&self, key: &SnapshotKey) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().map_err(io)?;
        Self::remove(&self.active_path(key))
    }

    fn park(&self, snapshot: &SessionSnapshot) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().map_err(io)?;
        let path = self.parked_path(&snapshot.key());
        let mut entries: Vec<SessionSnapshot> = Self::read_json(&path)?.unwrap_or_default();
        entries.retain(|s| s.session_id != snapshot.session_id);
        entries.push(snapshot.clone());
        Self::write_json(&path, &entries)
    }

    fn parked(&self, key: &SnapshotKey) -> Result<Vec<SessionSnapshot>, StorageError> {
        Ok(Self::read_json(&self.parked_path(key))?.unwrap_or_default())
    }

    fn unpark(&self, key: &SnapshotKey, session_id: &SessionId) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().map_err(io)?;
        let path = self.parked_path(key);
        let mut entries: Vec<SessionSnapshot> = Self::read_json(&path)?.unwrap_or_default();
        entries.retain(|s| &s.session_id != session_id);
        if entries.is_empty() {
            Self::remove(&path)
        } else {
            Self::write_json(&path, &entries)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use learn_core::model::{ItemId, LessonId, RemoteSync, SessionMode, SessionState};
    use learn_core::time::fixed_now;

    fn snapshot(lesson: u64) -> SessionSnapshot {
        let lesson_id = LessonId::new(lesson);
        let state = SessionState::new(
            SessionId::local(lesson_id, fixed_now()),
            SessionMode::Study,
            lesson_id,
            vec![ItemId::new(1), ItemId::new(2)],
            fixed_now(),
        )
        .unwrap();
        SessionSnapshot::capture(&state, RemoteSync::NoRemote, fixed_now())
    }

    #[test]
    fn active_snapshot_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let snap = snapshot(3);
        let key = snap.key();

        let store = FileSnapshotStore::open(dir.path()).unwrap();
        assert_eq!(store.get(&key).unwrap(), None);
        store.set(&key, &snap).unwrap();

        let reopened = FileSnapshotStore::open(dir.path()).unwrap();
        assert_eq!(reopened.get(&key).unwrap(), Some(snap));
        assert!(dir.path().join("study-3.json").exists());

        reopened.clear(&key).unwrap();
        reopened.clear(&key).unwrap();
        assert_eq!(reopened.get(&key).unwrap(), None);
    }

    #[test]
    fn corrupt_file_is_a_serialization_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("study-3.json"), b"{not json").unwrap();
        let store = FileSnapshotStore::open(dir.path()).unwrap();
        let err = store.get(&snapshot(3).key()).unwrap_err();
        assert!(matches!(err, StorageError::Serialization(_)));
    }

    #[test]
    fn parked_snapshots_are_listed_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::open(dir.path()).unwrap();
        let snap = snapshot(5);
        let key = snap.key();

        store.park(&snap).unwrap();
        assert_eq!(store.parked(&key).unwrap(), vec![snap.clone()]);

        store.unpark(&key, &snap.session_id).unwrap();
        assert!(store.parked(&key).unwrap().is_empty());
        assert!(!dir.path().join("study-5.parked.json").exists());
    }
}
