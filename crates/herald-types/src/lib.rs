//! Shared type definitions for Herald.
//!
//! This crate is the single source of truth for the data model used across
//! the workspace: the store persists [`GameRecord`]s, the core compares them
//! against [`RemoteSnapshot`]s, and the announcer binary configures
//! [`TrackedGame`]s.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe wrappers for universe, channel and place identifiers
//! - [`structs`] -- Tracked games, persisted records and fetched remote state

pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use ids::{ChannelId, PlaceId, UniverseId};
pub use structs::{
    GameMetadata, GameRecord, PlaceInfo, RemoteSnapshot, Snapshot, TrackedGame,
};
