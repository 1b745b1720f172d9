//! Core structs shared across the Herald workspace.
//!
//! Covers the externally configured [`TrackedGame`], the persisted
//! per-universe [`GameRecord`], and the remote state fetched from the
//! catalog ([`GameMetadata`], [`PlaceInfo`], [`RemoteSnapshot`]).

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::ids::{ChannelId, PlaceId, UniverseId};

// ---------------------------------------------------------------------------
// Configuration-owned
// ---------------------------------------------------------------------------

/// A universe being watched and the channel its announcements go to.
///
/// Supplied by configuration and immutable for the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedGame {
    /// Universe to poll.
    pub universe_id: UniverseId,
    /// Channel announcements for this universe are posted to.
    pub channel_id: ChannelId,
    /// Optional label used in announcements instead of the catalog name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl TrackedGame {
    /// Create a tracked game without a display name override.
    pub fn new(universe_id: impl Into<UniverseId>, channel_id: impl Into<ChannelId>) -> Self {
        Self {
            universe_id: universe_id.into(),
            channel_id: channel_id.into(),
            display_name: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Persisted
// ---------------------------------------------------------------------------

/// Last-known state of one universe, as persisted between restarts.
///
/// Every field carries a serde default so documents written by earlier,
/// narrower versions of the record (visit count only, no places, no
/// timestamp) still load; missing fields come back empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameRecord {
    /// Last-observed catalog name.
    #[serde(default)]
    pub name: String,

    /// Visit count at which the most recent milestone was announced.
    #[serde(default)]
    pub last_visit: u64,

    /// Every place id seen in the most recent reconciliation.
    #[serde(default)]
    pub place_ids: BTreeSet<PlaceId>,

    /// Last-observed raw "updated" token. `None` until first observation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated_timestamp: Option<String>,
}

/// The whole persisted document: one record per reconciled universe.
pub type Snapshot = BTreeMap<UniverseId, GameRecord>;

// ---------------------------------------------------------------------------
// Remote
// ---------------------------------------------------------------------------

/// Catalog metadata for a universe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameMetadata {
    /// Display name shown on the catalog.
    pub name: String,
    /// Lifetime visit count.
    pub visits: u64,
    /// Opaque "content updated" token (an RFC 3339 string on Roblox).
    pub updated_at: String,
}

/// One place listed under a universe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceInfo {
    /// Place identifier.
    pub id: PlaceId,
    /// Place name, when the listing carried one.
    #[serde(default)]
    pub name: Option<String>,
}

impl PlaceInfo {
    /// Create a named place.
    pub fn named(id: u64, name: impl Into<String>) -> Self {
        Self {
            id: PlaceId(id),
            name: Some(name.into()),
        }
    }
}

/// Everything fetched for one universe in one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSnapshot {
    /// Catalog metadata.
    pub metadata: GameMetadata,
    /// Places in the order the listing returned them.
    pub places: Vec<PlaceInfo>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn record_serializes_with_camel_case_fields() {
        let record = GameRecord {
            name: "Obby".to_owned(),
            last_visit: 2000,
            place_ids: [PlaceId(3), PlaceId(1)].into_iter().collect(),
            last_updated_timestamp: Some("2024-01-01T00:00:00Z".to_owned()),
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "name": "Obby",
                "lastVisit": 2000,
                "placeIds": [1, 3],
                "lastUpdatedTimestamp": "2024-01-01T00:00:00Z"
            })
        );
    }

    #[test]
    fn absent_timestamp_is_omitted() {
        let value = serde_json::to_value(GameRecord::default()).unwrap();
        assert!(value.get("lastUpdatedTimestamp").is_none());
    }

    #[test]
    fn narrow_record_backfills_defaults() {
        let record: GameRecord = serde_json::from_str(r#"{"lastVisit": 5000}"#).unwrap();
        assert_eq!(record.last_visit, 5000);
        assert!(record.name.is_empty());
        assert!(record.place_ids.is_empty());
        assert!(record.last_updated_timestamp.is_none());
    }

    #[test]
    fn snapshot_keys_are_universe_ids() {
        let doc = r#"{"123": {"name": "A", "lastVisit": 0, "placeIds": []}}"#;
        let snapshot: Snapshot = serde_json::from_str(doc).unwrap();
        assert!(snapshot.contains_key(&UniverseId::new("123")));
    }

    #[test]
    fn place_name_is_optional() {
        let place: PlaceInfo = serde_json::from_str(r#"{"id": 9}"#).unwrap();
        assert_eq!(place.id, PlaceId(9));
        assert!(place.name.is_none());
    }
}
