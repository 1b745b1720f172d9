//! In-process [`SnapshotStore`] for tests and dry runs.
//!
//! Keeps the "persisted" document in memory behind a mutex and counts
//! saves, so callers can assert that a tick performed no I/O. Writes can be
//! made to fail to exercise persistence-error handling.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use herald_types::Snapshot;

use crate::error::StoreError;
use crate::snapshot_store::SnapshotStore;
use crate::state::StoredState;

/// A [`SnapshotStore`] that never touches the filesystem.
#[derive(Debug, Default)]
pub struct MemoryStore {
    document: Mutex<Option<Snapshot>>,
    saves: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store with no persisted document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store whose persisted document is `snapshot`.
    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        Self {
            document: Mutex::new(Some(snapshot)),
            ..Self::default()
        }
    }

    /// Make subsequent saves fail (`true`) or succeed (`false`).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Release);
    }

    /// Number of successful saves so far, including the initial empty write.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::Acquire)
    }

    /// A copy of the currently persisted document, if any.
    pub fn persisted(&self) -> Option<Snapshot> {
        self.document
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn write(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::Acquire) {
            return Err(StoreError::Rejected("simulated write failure".to_owned()));
        }
        *self.document.lock().unwrap_or_else(PoisonError::into_inner) = Some(snapshot.clone());
        self.saves.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}

impl SnapshotStore for MemoryStore {
    async fn load(&self) -> Result<StoredState, StoreError> {
        if let Some(snapshot) = self.persisted() {
            return Ok(StoredState::Records(snapshot));
        }
        let empty = Snapshot::new();
        self.write(&empty)?;
        Ok(StoredState::Records(empty))
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        self.write(snapshot)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use herald_types::{GameRecord, UniverseId};

    use super::*;

    #[tokio::test]
    async fn first_load_writes_empty_document() {
        let store = MemoryStore::new();
        assert!(store.persisted().is_none());
        assert_eq!(
            store.load().await.unwrap(),
            StoredState::Records(Snapshot::new())
        );
        assert_eq!(store.persisted(), Some(Snapshot::new()));
        assert_eq!(store.save_count(), 1);
    }

    #[tokio::test]
    async fn failed_write_keeps_previous_document() {
        let mut snapshot = Snapshot::new();
        snapshot.insert(UniverseId::new("1"), GameRecord::default());
        let store = MemoryStore::with_snapshot(snapshot.clone());

        store.set_fail_writes(true);
        assert!(store.save(&Snapshot::new()).await.is_err());
        assert_eq!(store.persisted(), Some(snapshot));
        assert_eq!(store.save_count(), 0);
    }
}
