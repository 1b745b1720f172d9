//! Reconciliation service: the driver from remote state to announcements.
//!
//! Orchestrates, per tracked game and per tick:
//! 1. Fetch catalog metadata and the place listing (concurrently)
//! 2. Run the detectors against a working copy of the game's record
//! 3. Commit the working copy to the in-memory snapshot if anything changed
//! 4. Persist the whole snapshot if anything changed
//! 5. Dispatch announcements in detector order
//!
//! ```text
//! Idle --> Fetching --> Detecting --> Persisting (if dirty) --> Announcing --> Idle
//! ```
//!
//! Games within a pass are reconciled concurrently and independently. A
//! fetch failure abandons only that game's tick. A dispatch failure loses
//! only that announcement: the record mutation has already been committed,
//! so delivery is at most once.
//!
//! Saves go through a single writer lock, and the snapshot is cloned only
//! after that lock is held, so every save contains every mutation committed
//! before it. A failed save leaves the in-memory state ahead of the durable
//! state; the service keeps retrying the flush at the start of every pass
//! until one succeeds.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use herald_store::{SnapshotStore, StoreError, StoredState};
use herald_types::{GameRecord, RemoteSnapshot, Snapshot, TrackedGame, UniverseId};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::ServiceSettings;
use crate::detect;
use crate::message;
use crate::notify::Notifier;
use crate::source::{FetchError, GameDataSource};
use crate::ticker::Ticker;

/// Errors that stop the service from starting or shutting down cleanly.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The persisted snapshot could not be loaded.
    #[error("state store error: {source}")]
    Store {
        /// The underlying store error.
        #[from]
        source: StoreError,
    },

    /// A single-game legacy document was found but the service tracks a
    /// different number of games, so its owner is ambiguous.
    #[error("legacy single-game state cannot be assigned: {games} games are tracked")]
    AmbiguousLegacyState {
        /// Number of tracked games.
        games: usize,
    },

    /// The background polling task panicked or was aborted.
    #[error("service task failed: {message}")]
    Task {
        /// Description of the failure.
        message: String,
    },
}

/// What happened to one game in one pass.
#[derive(Debug)]
pub enum GameOutcome {
    /// Detectors ran against fresh remote data.
    Reconciled {
        /// Whether the record changed (and a save was attempted).
        dirty: bool,
        /// Whether the save failed.
        persist_failed: bool,
        /// Announcements produced by the detectors.
        announcements: usize,
        /// Announcements the notifier accepted.
        delivered: usize,
    },
    /// The fetch failed; nothing was mutated or announced.
    FetchFailed(FetchError),
    /// A previous reconciliation of this game was still running, or the
    /// game is not tracked by the service.
    Skipped,
}

/// Summary of one pass over every tracked game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PassReport {
    /// Tick number of the pass.
    pub tick: u64,
    /// Games whose detectors ran.
    pub reconciled: usize,
    /// Games skipped because they were still in flight or not tracked.
    pub skipped: usize,
    /// Games whose fetch failed.
    pub fetch_failures: usize,
    /// Games whose record changed but could not be saved.
    pub persist_failures: usize,
    /// Announcements produced.
    pub announcements: usize,
    /// Announcements delivered.
    pub delivered: usize,
}

impl PassReport {
    fn record(&mut self, outcome: &GameOutcome) {
        match outcome {
            GameOutcome::Reconciled {
                persist_failed,
                announcements,
                delivered,
                ..
            } => {
                self.reconciled = self.reconciled.saturating_add(1);
                if *persist_failed {
                    self.persist_failures = self.persist_failures.saturating_add(1);
                }
                self.announcements = self.announcements.saturating_add(*announcements);
                self.delivered = self.delivered.saturating_add(*delivered);
            }
            GameOutcome::FetchFailed(_) => {
                self.fetch_failures = self.fetch_failures.saturating_add(1);
            }
            GameOutcome::Skipped => {
                self.skipped = self.skipped.saturating_add(1);
            }
        }
    }

    /// Log the pass summary.
    pub fn log(&self) {
        info!(
            tick = self.tick,
            reconciled = self.reconciled,
            skipped = self.skipped,
            fetch_failures = self.fetch_failures,
            persist_failures = self.persist_failures,
            announcements = self.announcements,
            delivered = self.delivered,
            "Pass complete"
        );
    }
}

/// The reconciliation engine.
///
/// Owns the injected data source, notifier and store plus the in-memory
/// snapshot. Share it behind an [`Arc`] to [`start`](Self::start) the
/// polling loop, or call [`run_pass`](Self::run_pass) directly.
pub struct ReconciliationService<D, N, S> {
    source: D,
    notifier: N,
    store: S,
    settings: ServiceSettings,
    records: Mutex<Snapshot>,
    writer: Mutex<()>,
    in_flight: BTreeMap<UniverseId, Mutex<()>>,
    flush_pending: AtomicBool,
}

impl<D, N, S> ReconciliationService<D, N, S>
where
    D: GameDataSource + Send + Sync,
    N: Notifier + Send + Sync,
    S: SnapshotStore + Send + Sync,
{
    /// Load the persisted snapshot and build the service.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Store`] if the snapshot is corrupt or cannot
    /// be read. This is fatal: polling must not start with unknown state.
    /// Returns [`ServiceError::AmbiguousLegacyState`] if the store holds a
    /// single-game counter and more than one game is tracked.
    pub async fn open(
        settings: ServiceSettings,
        source: D,
        notifier: N,
        store: S,
    ) -> Result<Self, ServiceError> {
        let records = match store.load().await? {
            StoredState::Records(records) => records,
            StoredState::Legacy {
                last_announced_visit,
            } => {
                let records = migrate_legacy(&settings, last_announced_visit)?;
                store.save(&records).await?;
                info!(
                    last_announced_visit,
                    "Migrated single-game state document to keyed records"
                );
                records
            }
        };
        let in_flight = settings
            .games
            .iter()
            .map(|game| (game.universe_id.clone(), Mutex::new(())))
            .collect();

        info!(
            games = settings.games.len(),
            known_records = records.len(),
            milestone_frequency = settings.frequency.get(),
            "Reconciliation service opened"
        );

        Ok(Self {
            source,
            notifier,
            store,
            settings,
            records: Mutex::new(records),
            writer: Mutex::new(()),
            in_flight,
            flush_pending: AtomicBool::new(false),
        })
    }

    /// The settings the service runs with.
    pub const fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    /// The injected data source.
    pub const fn source(&self) -> &D {
        &self.source
    }

    /// The injected notifier.
    pub const fn notifier(&self) -> &N {
        &self.notifier
    }

    /// The injected snapshot store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// A copy of the in-memory record for `universe_id`.
    pub async fn record(&self, universe_id: &UniverseId) -> Option<GameRecord> {
        self.records.lock().await.get(universe_id).cloned()
    }

    /// A copy of the whole in-memory snapshot.
    pub async fn snapshot(&self) -> Snapshot {
        self.records.lock().await.clone()
    }

    /// Whether the in-memory snapshot is ahead of the persisted one.
    pub fn flush_pending(&self) -> bool {
        self.flush_pending.load(Ordering::Acquire)
    }

    /// Reconcile every tracked game once.
    pub async fn run_pass(&self, tick: u64) -> PassReport {
        debug!(tick, games = self.settings.games.len(), "Pass starting");

        if self.flush_pending() {
            match self.persist().await {
                Ok(()) => info!(tick, "Pending state flushed"),
                Err(e) => error!(tick, error = %e, "Pending state flush failed again"),
            }
        }

        let outcomes = futures::future::join_all(
            self.settings
                .games
                .iter()
                .map(|game| self.reconcile_game(game)),
        )
        .await;

        let mut report = PassReport {
            tick,
            ..PassReport::default()
        };
        for outcome in &outcomes {
            report.record(outcome);
        }
        report
    }

    /// Reconcile one game: fetch, detect, persist, announce.
    ///
    /// Never fails: every per-game error is logged and reported in the
    /// returned [`GameOutcome`]. A game that is not in the service's
    /// settings is reported as [`GameOutcome::Skipped`].
    pub async fn reconcile_game(&self, game: &TrackedGame) -> GameOutcome {
        let universe_id = &game.universe_id;

        let Some(slot) = self.in_flight.get(universe_id) else {
            warn!(
                universe_id = %universe_id,
                "Game is not tracked by this service, skipping"
            );
            return GameOutcome::Skipped;
        };
        let Ok(_guard) = slot.try_lock() else {
            debug!(
                universe_id = %universe_id,
                "Previous reconciliation still in flight, skipping"
            );
            return GameOutcome::Skipped;
        };

        // --- Fetching ---
        let remote = match self.fetch(universe_id).await {
            Ok(remote) => remote,
            Err(e) => {
                warn!(
                    universe_id = %universe_id,
                    stage = "fetch",
                    error = %e,
                    "Fetch failed, abandoning tick for this game"
                );
                return GameOutcome::FetchFailed(e);
            }
        };

        // --- Detecting ---
        let (dirty, announcements, label) = {
            let mut records = self.records.lock().await;
            let existing = records.get(universe_id);
            let created = existing.is_none();
            let mut working = existing.cloned().unwrap_or_default();

            let outcome = detect::run_detectors(&mut working, &remote, self.settings.frequency);
            let dirty = outcome.dirty || created;
            let label = announcement_label(game, &working);

            if dirty {
                records.insert(universe_id.clone(), working);
            }
            (dirty, outcome.announcements, label)
        };

        debug!(
            universe_id = %universe_id,
            visits = remote.metadata.visits,
            places = remote.places.len(),
            dirty,
            announcements = announcements.len(),
            "Detectors ran"
        );

        // --- Persisting ---
        let mut persist_failed = false;
        if dirty && let Err(e) = self.persist().await {
            persist_failed = true;
            error!(
                universe_id = %universe_id,
                stage = "persist",
                error = %e,
                "Failed to persist state; in-memory record kept, flush will be retried"
            );
        }

        // --- Announcing ---
        let mut delivered: usize = 0;
        for announcement in &announcements {
            let text = message::render(announcement, &label, &self.settings.message_style);
            match self.notifier.send(&game.channel_id, &text).await {
                Ok(()) => {
                    delivered = delivered.saturating_add(1);
                    info!(
                        universe_id = %universe_id,
                        channel_id = %game.channel_id,
                        kind = announcement.kind(),
                        "Announcement sent"
                    );
                }
                Err(e) => {
                    warn!(
                        universe_id = %universe_id,
                        channel_id = %game.channel_id,
                        stage = "announce",
                        kind = announcement.kind(),
                        error = %e,
                        "Announcement dispatch failed"
                    );
                }
            }
        }

        GameOutcome::Reconciled {
            dirty,
            persist_failed,
            announcements: announcements.len(),
            delivered,
        }
    }

    /// Start the polling loop on the current tokio runtime.
    ///
    /// One pass runs per tick from `ticker`. The loop ends when the ticker
    /// ends or [`ServiceHandle::stop`] is called; a pass already running is
    /// allowed to finish. Dropping the handle also stops the loop.
    pub fn start<T>(self: Arc<Self>, mut ticker: T) -> ServiceHandle
    where
        T: Ticker + Send + 'static,
        D: 'static,
        N: 'static,
        S: 'static,
    {
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            info!(
                games = self.settings.games.len(),
                poll_interval_secs = self.settings.poll_interval.as_secs(),
                "Polling loop started"
            );
            loop {
                tokio::select! {
                    biased;
                    _ = stop_rx.changed() => {
                        info!("Stop requested");
                        break;
                    }
                    tick = ticker.next_tick() => {
                        let Some(tick) = tick else {
                            info!("Tick source ended");
                            break;
                        };
                        self.run_pass(tick).await.log();
                    }
                }
            }
            info!("Polling loop stopped");
        });

        ServiceHandle { stop_tx, task }
    }

    async fn fetch(&self, universe_id: &UniverseId) -> Result<RemoteSnapshot, FetchError> {
        let (metadata, places) = tokio::try_join!(
            self.source.fetch_metadata(universe_id),
            self.source.fetch_places(universe_id),
        )?;
        // Every universe has at least its root place.
        if places.is_empty() {
            return Err(FetchError::Malformed {
                message: format!("empty place listing for universe {universe_id}"),
            });
        }
        Ok(RemoteSnapshot { metadata, places })
    }

    async fn persist(&self) -> Result<(), StoreError> {
        let _writer = self.writer.lock().await;
        let snapshot = self.records.lock().await.clone();
        match self.store.save(&snapshot).await {
            Ok(()) => {
                self.flush_pending.store(false, Ordering::Release);
                Ok(())
            }
            Err(e) => {
                self.flush_pending.store(true, Ordering::Release);
                Err(e)
            }
        }
    }
}

/// Build keyed records from a single-game counter. The counter is floored
/// to a multiple of the configured frequency.
fn migrate_legacy(
    settings: &ServiceSettings,
    last_announced_visit: u64,
) -> Result<Snapshot, ServiceError> {
    let [game] = settings.games.as_slice() else {
        return Err(ServiceError::AmbiguousLegacyState {
            games: settings.games.len(),
        });
    };
    let record = GameRecord {
        last_visit: detect::milestone_floor(last_announced_visit, settings.frequency),
        ..GameRecord::default()
    };
    Ok(Snapshot::from([(game.universe_id.clone(), record)]))
}

/// Name used in announcement text: configured display name, else the
/// catalog name, else the universe id.
fn announcement_label(game: &TrackedGame, record: &GameRecord) -> String {
    game.display_name
        .as_deref()
        .filter(|name| !name.trim().is_empty())
        .or_else(|| Some(record.name.as_str()).filter(|name| !name.trim().is_empty()))
        .map_or_else(|| game.universe_id.to_string(), ToOwned::to_owned)
}

/// Control handle for a running polling loop.
#[derive(Debug)]
pub struct ServiceHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ServiceHandle {
    /// Ask the loop to stop after any in-progress pass and wait for it.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Task`] if the loop task panicked.
    pub async fn stop(self) -> Result<(), ServiceError> {
        let _ = self.stop_tx.send(true);
        self.join_task().await
    }

    /// Wait for the loop to end on its own (its ticker ran out).
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Task`] if the loop task panicked.
    pub async fn join(self) -> Result<(), ServiceError> {
        self.join_task().await
    }

    async fn join_task(self) -> Result<(), ServiceError> {
        let Self { stop_tx, task } = self;
        let result = task.await.map_err(|e| ServiceError::Task {
            message: e.to_string(),
        });
        drop(stop_tx);
        result
    }
}
