//! Snapshot Store for Herald.
//!
//! Durable mapping from universe id to its last-known [`GameRecord`]:
//! load on start, save on change, whole-document overwrite. The store is a
//! pure persistence boundary and holds no reconciliation logic.
//!
//! # Modules
//!
//! - [`snapshot_store`] -- The [`SnapshotStore`] trait and the JSON file backend
//! - [`memory_store`] -- In-process backend used by tests
//! - [`state`] -- [`StoredState`]: keyed records or a legacy single-game counter
//! - [`error`] -- Shared error types
//!
//! [`GameRecord`]: herald_types::GameRecord

pub mod error;
pub mod memory_store;
pub mod snapshot_store;
pub mod state;

// Re-export primary types for convenience.
pub use error::StoreError;
pub use memory_store::MemoryStore;
pub use snapshot_store::{JsonFileStore, SnapshotStore};
pub use state::StoredState;
