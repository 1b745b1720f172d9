//! Error types for the snapshot store.
//!
//! All errors are propagated via [`StoreError`], which wraps the underlying
//! I/O and JSON errors with the path of the document that failed.

use std::path::PathBuf;

/// Errors that can occur while loading or saving the snapshot document.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The persisted document exists but is not a valid snapshot.
    ///
    /// Fatal at startup: polling must not begin with unknown state.
    #[error("corrupt state document {}: {source}", path.display())]
    CorruptState {
        /// Path of the unreadable document.
        path: PathBuf,
        /// The underlying parse error.
        source: serde_json::Error,
    },

    /// Reading or writing the document failed.
    #[error("state I/O error on {}: {source}", path.display())]
    Io {
        /// Path being read or written.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The in-memory snapshot could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A simulated write failure (in-memory store only).
    #[error("write rejected: {0}")]
    Rejected(String),
}
