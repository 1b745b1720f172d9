//! Decoded forms of the state document.
//!
//! Current documents map universe ids to records. Deployments of the
//! single-game announcer wrote a flat counter instead:
//!
//! ```text
//! { "lastAnnouncedVisit": 12000 }
//! ```
//!
//! The store cannot migrate that shape by itself because the document does
//! not say which universe it belongs to, so it hands it up as
//! [`StoredState::Legacy`].

use herald_types::Snapshot;
use serde::Deserialize;

/// What a `load` found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredState {
    /// Keyed per-universe records.
    Records(Snapshot),
    /// Flat single-game counter.
    Legacy {
        /// Highest milestone the single-game announcer had posted.
        last_announced_visit: u64,
    },
}

impl StoredState {
    /// The keyed records, if this is a current document.
    pub fn records(self) -> Option<Snapshot> {
        match self {
            Self::Records(snapshot) => Some(snapshot),
            Self::Legacy { .. } => None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct LegacyDocument {
    #[serde(default)]
    last_announced_visit: u64,
}

/// Decode a state document.
///
/// Tries the keyed shape first. When that fails, the flat legacy shape is
/// accepted; otherwise the keyed shape's error is returned.
pub(crate) fn decode(contents: &[u8]) -> Result<StoredState, serde_json::Error> {
    match serde_json::from_slice::<Snapshot>(contents) {
        Ok(snapshot) => Ok(StoredState::Records(snapshot)),
        Err(keyed_error) => match serde_json::from_slice::<LegacyDocument>(contents) {
            Ok(legacy) => Ok(StoredState::Legacy {
                last_announced_visit: legacy.last_announced_visit,
            }),
            Err(_) => Err(keyed_error),
        },
    }
}
