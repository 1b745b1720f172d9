//! Snapshot persistence for per-universe game records.
//!
//! The whole [`Snapshot`] is one JSON document. It is always written whole:
//! the new content goes to a uniquely named temp file beside the target,
//! is fsynced, and is then renamed over the target, so a concurrent or
//! subsequent `load` sees either the old document or the new one, never a
//! mix.
//!
//! ```text
//! {
//!   "4922741943": {
//!     "name": "My Obby",
//!     "lastVisit": 12000,
//!     "placeIds": [101, 102],
//!     "lastUpdatedTimestamp": "2024-05-01T12:00:00.000Z"
//!   }
//! }
//! ```

use std::future::Future;
use std::path::{Path, PathBuf};

use herald_types::Snapshot;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::error::StoreError;
use crate::state::{self, StoredState};

/// Durable storage for the snapshot document.
///
/// The store holds no business logic. Implementations must make `save`
/// atomic from the point of view of a later `load`.
pub trait SnapshotStore {
    /// Read the persisted state.
    ///
    /// If nothing has been persisted yet, returns empty records and durably
    /// writes an empty document. A flat legacy counter is returned as
    /// [`StoredState::Legacy`] for the caller to migrate.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::CorruptState`] if the document cannot be
    /// parsed, or [`StoreError::Io`] if it cannot be read or created.
    fn load(&self) -> impl Future<Output = Result<StoredState, StoreError>> + Send;

    /// Overwrite the persisted document with `snapshot`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if serialization or the write fails. On
    /// failure the previously persisted document is left intact.
    fn save(&self, snapshot: &Snapshot) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// A [`SnapshotStore`] backed by a single JSON file on disk.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Create a store bound to `path`. Nothing is touched until `load`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the persisted document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }

    async fn write_atomic(&self, payload: &[u8]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }

        let temp_path = self
            .path
            .with_extension(format!("{}.tmp", Uuid::new_v4().simple()));

        let mut file = tokio::fs::File::create(&temp_path)
            .await
            .map_err(|e| self.io_error(e))?;
        let written = async {
            file.write_all(payload).await?;
            file.sync_all().await
        }
        .await;
        drop(file);

        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(self.io_error(e));
        }

        if let Err(e) = tokio::fs::rename(&temp_path, &self.path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(self.io_error(e));
        }

        Ok(())
    }
}

impl SnapshotStore for JsonFileStore {
    async fn load(&self) -> Result<StoredState, StoreError> {
        let contents = match tokio::fs::read(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let empty = Snapshot::new();
                self.save(&empty).await?;
                tracing::info!(path = %self.path.display(), "Created empty state document");
                return Ok(StoredState::Records(empty));
            }
            Err(e) => return Err(self.io_error(e)),
        };

        let state = state::decode(&contents).map_err(|source| StoreError::CorruptState {
            path: self.path.clone(),
            source,
        })?;

        match &state {
            StoredState::Records(snapshot) => tracing::info!(
                path = %self.path.display(),
                records = snapshot.len(),
                "Loaded state document"
            ),
            StoredState::Legacy {
                last_announced_visit,
            } => tracing::info!(
                path = %self.path.display(),
                last_announced_visit,
                "Loaded single-game state document"
            ),
        }
        Ok(state)
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let payload = serde_json::to_vec_pretty(snapshot)?;
        self.write_atomic(&payload).await?;
        tracing::debug!(
            path = %self.path.display(),
            records = snapshot.len(),
            "Saved state document"
        );
        Ok(())
    }
}
