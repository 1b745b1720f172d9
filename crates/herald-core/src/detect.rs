//! Change detectors.
//!
//! Each detector compares one aspect of a freshly fetched
//! [`RemoteSnapshot`] against the stored [`GameRecord`], mutates the
//! working copy of the record, and yields at most one [`Announcement`].
//! Detectors are synchronous and do no I/O.
//!
//! # Evaluation order
//!
//! ```text
//! name sync --> milestone --> new places --> update timestamp
//! ```
//!
//! Name sync runs first so later announcements use the freshest name.
//! [`run_detectors`] applies all four and collects announcements in that
//! order.

use std::collections::BTreeSet;

use herald_types::{GameRecord, PlaceInfo, RemoteSnapshot};

use crate::config::MilestoneFrequency;

/// An event worth telling the channel about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Announcement {
    /// The universe's visit count crossed a milestone.
    Milestone {
        /// The milestone reached (a multiple of `F`).
        milestone: u64,
    },
    /// One or more places appeared that were not known before.
    NewPlaces {
        /// The new places, in listing order.
        places: Vec<PlaceInfo>,
    },
    /// The universe's content "updated" token changed.
    Updated {
        /// The new raw token.
        updated_at: String,
    },
}

impl Announcement {
    /// Short name of the detector that produced this announcement, for logs.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Milestone { .. } => "milestone",
            Self::NewPlaces { .. } => "new_places",
            Self::Updated { .. } => "update",
        }
    }
}

/// Result of a single detector.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Detection {
    /// Whether the detector changed any record field.
    pub changed: bool,
    /// The announcement to send, if the detector fired.
    pub announcement: Option<Announcement>,
}

impl Detection {
    const fn unchanged() -> Self {
        Self {
            changed: false,
            announcement: None,
        }
    }

    const fn silent(changed: bool) -> Self {
        Self {
            changed,
            announcement: None,
        }
    }

    const fn fired(announcement: Announcement) -> Self {
        Self {
            changed: true,
            announcement: Some(announcement),
        }
    }
}

/// Accumulated result of running every detector for one game.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DetectionOutcome {
    /// Whether any detector changed the record.
    pub dirty: bool,
    /// Announcements in detector order.
    pub announcements: Vec<Announcement>,
}

impl DetectionOutcome {
    fn absorb(&mut self, detection: Detection) {
        self.dirty |= detection.changed;
        if let Some(announcement) = detection.announcement {
            self.announcements.push(announcement);
        }
    }
}

/// Keep `record.name` equal to the catalog name. Never announces.
pub fn sync_name(record: &mut GameRecord, remote_name: &str) -> Detection {
    if record.name == remote_name {
        return Detection::unchanged();
    }
    remote_name.clone_into(&mut record.name);
    Detection::silent(true)
}

/// Highest multiple of `frequency` not above `visits`.
pub fn milestone_floor(visits: u64, frequency: MilestoneFrequency) -> u64 {
    visits.saturating_sub(visits % frequency.non_zero())
}

/// Fire once `visits` is at least one full step past the last announced
/// milestone.
///
/// A jump across several multiples in one tick announces only the highest
/// one reached; skipped milestones are never backfilled.
pub fn detect_milestone(
    record: &mut GameRecord,
    visits: u64,
    frequency: MilestoneFrequency,
) -> Detection {
    let threshold = record.last_visit.saturating_add(frequency.get());
    let milestone = milestone_floor(visits, frequency);
    if visits < threshold || milestone <= record.last_visit {
        return Detection::unchanged();
    }

    record.last_visit = milestone;
    Detection::fired(Announcement::Milestone { milestone })
}

/// Fire when the listing contains ids the record has not seen.
///
/// The record's id set only grows: listed ids are merged in, and ids missing
/// from this listing are kept so a place that drops out and reappears is
/// not announced again.
pub fn detect_new_places(record: &mut GameRecord, places: &[PlaceInfo]) -> Detection {
    let mut listed = BTreeSet::new();
    let new_places: Vec<PlaceInfo> = places
        .iter()
        .filter(|place| listed.insert(place.id) && !record.place_ids.contains(&place.id))
        .cloned()
        .collect();

    if new_places.is_empty() {
        return Detection::unchanged();
    }

    record.place_ids.extend(listed);
    Detection::fired(Announcement::NewPlaces { places: new_places })
}

/// Fire when the raw "updated" token differs from the stored one.
///
/// The first observation only initialises the stored token. Tokens are
/// compared as raw strings, not as parsed times.
pub fn detect_update(record: &mut GameRecord, updated_at: &str) -> Detection {
    match record.last_updated_timestamp.as_deref() {
        None => {
            record.last_updated_timestamp = Some(updated_at.to_owned());
            Detection::silent(true)
        }
        Some(previous) if previous == updated_at => Detection::unchanged(),
        Some(_) => {
            record.last_updated_timestamp = Some(updated_at.to_owned());
            Detection::fired(Announcement::Updated {
                updated_at: updated_at.to_owned(),
            })
        }
    }
}

/// Run every detector in order against `record`.
pub fn run_detectors(
    record: &mut GameRecord,
    remote: &RemoteSnapshot,
    frequency: MilestoneFrequency,
) -> DetectionOutcome {
    let mut outcome = DetectionOutcome::default();
    outcome.absorb(sync_name(record, &remote.metadata.name));
    outcome.absorb(detect_milestone(record, remote.metadata.visits, frequency));
    outcome.absorb(detect_new_places(record, &remote.places));
    outcome.absorb(detect_update(record, &remote.metadata.updated_at));
    outcome
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use herald_types::{GameMetadata, PlaceId};

    use super::*;

    fn freq(f: u64) -> MilestoneFrequency {
        MilestoneFrequency::new(f).unwrap()
    }

    fn ids(record: &GameRecord) -> Vec<u64> {
        record.place_ids.iter().map(|p| p.get()).collect()
    }

    // -----------------------------------------------------------------------
    // Milestone
    // -----------------------------------------------------------------------

    #[test]
    fn milestone_sequence_coalesces() {
        let mut record = GameRecord::default();
        let f = freq(1000);

        let first = detect_milestone(&mut record, 500, f);
        assert_eq!(first, Detection::default());
        assert_eq!(record.last_visit, 0);

        let second = detect_milestone(&mut record, 1200, f);
        assert_eq!(
            second.announcement,
            Some(Announcement::Milestone { milestone: 1000 })
        );
        assert_eq!(record.last_visit, 1000);

        let third = detect_milestone(&mut record, 1800, f);
        assert!(third.announcement.is_none());
        assert!(!third.changed);
        assert_eq!(record.last_visit, 1000);
    }

    #[test]
    fn milestone_jump_announces_highest_only() {
        let mut record = GameRecord::default();
        let detection = detect_milestone(&mut record, 7_450, freq(1000));
        assert_eq!(
            detection.announcement,
            Some(Announcement::Milestone { milestone: 7000 })
        );
        assert_eq!(record.last_visit, 7000);
    }

    #[test]
    fn milestone_exact_boundary_fires() {
        let mut record = GameRecord {
            last_visit: 1000,
            ..GameRecord::default()
        };
        let detection = detect_milestone(&mut record, 2000, freq(1000));
        assert_eq!(
            detection.announcement,
            Some(Announcement::Milestone { milestone: 2000 })
        );
    }

    #[test]
    fn milestone_never_fires_twice() {
        let mut record = GameRecord::default();
        let f = freq(100);
        let mut announced = Vec::new();
        for visits in [50, 100, 100, 150, 199, 200, 260, 250, 420, 420, 999] {
            if let Some(Announcement::Milestone { milestone }) =
                detect_milestone(&mut record, visits, f).announcement
            {
                assert!(!announced.contains(&milestone));
                assert!(record.last_visit >= milestone);
                announced.push(milestone);
            }
        }
        assert_eq!(announced, vec![100, 200, 400, 900]);
    }

    #[test]
    fn milestone_does_not_regress_on_lower_visits() {
        let mut record = GameRecord {
            last_visit: 5000,
            ..GameRecord::default()
        };
        let detection = detect_milestone(&mut record, 10, freq(1000));
        assert!(!detection.changed);
        assert_eq!(record.last_visit, 5000);
    }

    #[test]
    fn milestone_handles_extreme_values() {
        let mut record = GameRecord {
            last_visit: u64::MAX - 5,
            ..GameRecord::default()
        };
        let detection = detect_milestone(&mut record, u64::MAX, freq(1000));
        assert!(detection.announcement.is_none());
        assert_eq!(milestone_floor(u64::MAX, freq(1)), u64::MAX);
    }

    // -----------------------------------------------------------------------
    // New places
    // -----------------------------------------------------------------------

    #[test]
    fn new_places_sequence() {
        let mut record = GameRecord::default();
        let two = vec![PlaceInfo::named(1, "Lobby"), PlaceInfo::named(2, "Arena")];

        let first = detect_new_places(&mut record, &two);
        assert_eq!(
            first.announcement,
            Some(Announcement::NewPlaces {
                places: two.clone()
            })
        );
        assert_eq!(ids(&record), vec![1, 2]);

        let second = detect_new_places(&mut record, &two);
        assert_eq!(second, Detection::default());

        let mut three = two;
        three.push(PlaceInfo::named(3, "Vault"));
        let third = detect_new_places(&mut record, &three);
        assert_eq!(
            third.announcement,
            Some(Announcement::NewPlaces {
                places: vec![PlaceInfo::named(3, "Vault")]
            })
        );
        assert_eq!(ids(&record), vec![1, 2, 3]);
    }

    #[test]
    fn new_places_keep_listing_order() {
        let mut record = GameRecord::default();
        record.place_ids.insert(PlaceId(5));
        let listing = vec![
            PlaceInfo::named(9, "Nine"),
            PlaceInfo::named(5, "Five"),
            PlaceInfo::named(7, "Seven"),
        ];
        let detection = detect_new_places(&mut record, &listing);
        assert_eq!(
            detection.announcement,
            Some(Announcement::NewPlaces {
                places: vec![PlaceInfo::named(9, "Nine"), PlaceInfo::named(7, "Seven")]
            })
        );
    }

    #[test]
    fn shrunk_listing_keeps_known_ids() {
        let mut record = GameRecord::default();
        record.place_ids = [PlaceId(1), PlaceId(2)].into_iter().collect();

        let detection = detect_new_places(&mut record, &[PlaceInfo::named(1, "Lobby")]);
        assert_eq!(detection, Detection::default());
        assert_eq!(ids(&record), vec![1, 2]);
    }

    #[test]
    fn reappearing_place_is_not_announced_again() {
        let mut record = GameRecord::default();
        let three = vec![
            PlaceInfo::named(1, "Lobby"),
            PlaceInfo::named(2, "Arena"),
            PlaceInfo::named(3, "Vault"),
        ];
        assert!(detect_new_places(&mut record, &three).announcement.is_some());

        let shrunk = detect_new_places(&mut record, three.get(..2).unwrap());
        assert_eq!(shrunk, Detection::default());

        let back = detect_new_places(&mut record, &three);
        assert_eq!(back, Detection::default());
        assert_eq!(ids(&record), vec![1, 2, 3]);
    }

    #[test]
    fn duplicate_listing_entries_announce_once() {
        let mut record = GameRecord::default();
        let listing = vec![PlaceInfo::named(4, "A"), PlaceInfo::named(4, "A")];
        let detection = detect_new_places(&mut record, &listing);
        assert_eq!(
            detection.announcement,
            Some(Announcement::NewPlaces {
                places: vec![PlaceInfo::named(4, "A")]
            })
        );
    }

    #[test]
    fn empty_listing_on_empty_record_is_noop() {
        let mut record = GameRecord::default();
        assert_eq!(detect_new_places(&mut record, &[]), Detection::default());
    }

    // -----------------------------------------------------------------------
    // Update timestamp
    // -----------------------------------------------------------------------

    #[test]
    fn update_timestamp_sequence() {
        let mut record = GameRecord::default();

        let first = detect_update(&mut record, "2024-01-01T00:00:00Z");
        assert!(first.changed);
        assert!(first.announcement.is_none());
        assert_eq!(
            record.last_updated_timestamp.as_deref(),
            Some("2024-01-01T00:00:00Z")
        );

        let second = detect_update(&mut record, "2024-01-01T00:00:00Z");
        assert_eq!(second, Detection::default());

        let third = detect_update(&mut record, "2024-02-01T00:00:00Z");
        assert_eq!(
            third.announcement,
            Some(Announcement::Updated {
                updated_at: "2024-02-01T00:00:00Z".to_owned()
            })
        );
        assert_eq!(
            record.last_updated_timestamp.as_deref(),
            Some("2024-02-01T00:00:00Z")
        );
    }

    #[test]
    fn update_compares_raw_tokens() {
        let mut record = GameRecord {
            last_updated_timestamp: Some("2024-01-01T00:00:00Z".to_owned()),
            ..GameRecord::default()
        };
        // Same instant, different rendering: still a change.
        let detection = detect_update(&mut record, "2024-01-01T00:00:00.000Z");
        assert!(detection.announcement.is_some());
    }

    // -----------------------------------------------------------------------
    // Combined
    // -----------------------------------------------------------------------

    fn remote(name: &str, visits: u64, updated: &str, places: &[(u64, &str)]) -> RemoteSnapshot {
        RemoteSnapshot {
            metadata: GameMetadata {
                name: name.to_owned(),
                visits,
                updated_at: updated.to_owned(),
            },
            places: places
                .iter()
                .map(|(id, n)| PlaceInfo::named(*id, *n))
                .collect(),
        }
    }

    #[test]
    fn detectors_run_in_fixed_order() {
        let mut record = GameRecord {
            name: "Old".to_owned(),
            last_visit: 0,
            place_ids: [PlaceId(1)].into_iter().collect(),
            last_updated_timestamp: Some("a".to_owned()),
        };
        let outcome = run_detectors(
            &mut record,
            &remote("New", 2500, "b", &[(1, "Lobby"), (2, "Arena")]),
            freq(1000),
        );
        assert!(outcome.dirty);
        let kinds: Vec<&str> = outcome.announcements.iter().map(Announcement::kind).collect();
        assert_eq!(kinds, vec!["milestone", "new_places", "update"]);
        assert_eq!(record.name, "New");
    }

    #[test]
    fn second_identical_run_is_clean() {
        let mut record = GameRecord::default();
        let snapshot = remote("Obby", 4321, "t1", &[(1, "Lobby")]);

        let first = run_detectors(&mut record, &snapshot, freq(1000));
        assert!(first.dirty);
        let after_first = record.clone();

        let second = run_detectors(&mut record, &snapshot, freq(1000));
        assert!(!second.dirty);
        assert!(second.announcements.is_empty());
        assert_eq!(record, after_first);
    }

    #[test]
    fn name_sync_alone_marks_dirty() {
        let mut record = GameRecord {
            name: "Before".to_owned(),
            ..GameRecord::default()
        };
        let detection = sync_name(&mut record, "After");
        assert!(detection.changed);
        assert!(detection.announcement.is_none());
        assert_eq!(record.name, "After");
    }
}
