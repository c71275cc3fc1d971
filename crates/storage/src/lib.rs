//! Local snapshot and durable session stores.

#![forbid(unsafe_code)]

pub mod file;
pub mod repository;
pub mod sqlite;

pub use file::FileSnapshotStore;
pub use repository::{
    CompletionRecord, InMemoryRemoteStore, InMemorySnapshotStore, RemoteSessionStore,
    SessionSnapshot, SnapshotKey, SnapshotStore, Storage, StorageError, UnavailableRemoteStore,
};
