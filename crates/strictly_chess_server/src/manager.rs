//! Game session management over a shared [`StateStore`].
//!
//! Every mutation re-reads the stored record, replays it through
//! [`GameSession`], and writes back under the version it read. Inside one
//! process a per-game mutex keeps writers in line; across processes the
//! version check does. A lost race re-validates the move against the fresh
//! record instead of overwriting it.

use crate::error::{StoreError, StoreErrorKind};
use crate::store::{GameId, GameView, SessionPatch, SessionRecord, StateStore};
use derive_new::new;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use strictly_chess::{GameSession, MoveOutcome, RulesEngine};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

const EVENT_CAPACITY: usize = 256;

/// Default number of re-validations after a lost compare-and-set.
pub const DEFAULT_MAX_CONFLICT_RETRIES: u32 = 3;

/// How often a long poll re-reads the store when no local event arrives.
pub const DEFAULT_RECHECK_INTERVAL: Duration = Duration::from_millis(500);

/// What happened to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChangeKind {
    /// New game stored.
    Created,
    /// A move was played.
    Moved,
    /// A move was refused; only the message changed.
    Rejected,
    /// Back to the starting position.
    Reset,
    /// Record deleted.
    Removed,
}

/// Notification published after every write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, new)]
pub struct SessionEvent {
    /// Game the write touched.
    pub game_id: GameId,
    /// Version after the write (0 after removal).
    pub version: u64,
    /// Kind of write.
    pub change: ChangeKind,
}

/// Answer to a submitted move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, new)]
pub struct MoveReply {
    /// What the session did with the token.
    pub outcome: MoveOutcome,
    /// Game after the submission.
    pub game: GameView,
}

/// Coordinates reads and writes of shared sessions.
///
/// Cheap to clone; clones share the store, the locks and the event channel.
#[derive(Debug, Clone)]
pub struct SessionManager<E: RulesEngine> {
    engine: E,
    store: Arc<dyn StateStore>,
    locks: Arc<Mutex<HashMap<GameId, Arc<tokio::sync::Mutex<()>>>>>,
    events: broadcast::Sender<SessionEvent>,
    max_conflict_retries: u32,
    recheck_interval: Duration,
}

impl<E: RulesEngine> SessionManager<E> {
    /// Creates a manager over `store`.
    #[instrument(skip(engine, store))]
    pub fn new(engine: E, store: Arc<dyn StateStore>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        info!(?store, "Creating SessionManager");
        Self {
            engine,
            store,
            locks: Arc::new(Mutex::new(HashMap::new())),
            events,
            max_conflict_retries: DEFAULT_MAX_CONFLICT_RETRIES,
            recheck_interval: DEFAULT_RECHECK_INTERVAL,
        }
    }

    /// Sets how many times a move is re-validated after losing a race.
    pub fn with_max_conflict_retries(mut self, retries: u32) -> Self {
        self.max_conflict_retries = retries;
        self
    }

    /// Sets the store re-read interval used by [`Self::wait_for_change`].
    pub fn with_recheck_interval(mut self, interval: Duration) -> Self {
        self.recheck_interval = interval;
        self
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    fn lock_for(&self, game_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(game_id.to_string()).or_default().clone()
    }

    // Drops the map entry for `game_id` if only the map and `lock` hold it.
    fn release_lock(&self, game_id: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        let idle = locks
            .get(game_id)
            .is_some_and(|held| Arc::ptr_eq(held, &lock) && Arc::strong_count(&lock) == 2);
        if idle {
            locks.remove(game_id);
            debug!(game_id, "Released game lock");
        }
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn publish(&self, game_id: &str, version: u64, change: ChangeKind) {
        // No receivers is fine.
        let _ = self
            .events
            .send(SessionEvent::new(game_id.to_string(), version, change));
    }

    async fn load(&self, game_id: &str) -> Result<SessionRecord, StoreError> {
        self.store
            .get(game_id)
            .await?
            .ok_or_else(|| StoreError::not_found(game_id))
    }

    /// Stores a new game at the starting position.
    ///
    /// # Errors
    ///
    /// `AlreadyExists` if the identifier is taken.
    #[instrument(skip(self))]
    pub async fn create(&self, game_id: &str) -> Result<GameView, StoreError> {
        let session = GameSession::new(self.engine.clone());
        let record = SessionRecord::from_state(session.state());
        let stored = self.store.compare_and_set(game_id, 0, record).await?;
        info!(game_id, "Game created");
        self.publish(game_id, stored.version, ChangeKind::Created);
        Ok(stored.view(game_id))
    }

    /// Returns the stored game, creating it first if needed.
    #[instrument(skip(self))]
    pub async fn open_or_create(&self, game_id: &str) -> Result<GameView, StoreError> {
        if let Some(record) = self.store.get(game_id).await? {
            debug!(game_id, version = record.version, "Opened existing game");
            return Ok(record.view(game_id));
        }
        match self.create(game_id).await {
            Err(e) if e.kind == StoreErrorKind::AlreadyExists => {
                debug!(game_id, "Lost creation race, reading winner");
                Ok(self.load(game_id).await?.view(game_id))
            }
            other => other,
        }
    }

    /// Current view of a game.
    #[instrument(skip(self))]
    pub async fn view(&self, game_id: &str) -> Result<GameView, StoreError> {
        Ok(self.load(game_id).await?.view(game_id))
    }

    /// Submits a raw move token.
    ///
    /// The move is validated against the latest stored record. Applied moves
    /// are written with compare-and-set; rejections only patch the message
    /// and last input, under the same version guard. A lost race is retried
    /// against the fresh record, so the move is judged in the position it
    /// would actually be played in.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown game, `Corrupt` if the stored position does
    /// not decode, `Conflict` once the retries are used up.
    #[instrument(skip(self))]
    pub async fn apply_move(&self, game_id: &str, raw: &str) -> Result<MoveReply, StoreError> {
        let lock = self.lock_for(game_id);
        let result = {
            let _guard = lock.lock().await;
            self.apply_move_locked(game_id, raw).await
        };
        if matches!(&result, Err(e) if e.kind == StoreErrorKind::NotFound) {
            self.release_lock(game_id, lock);
        }
        result
    }

    #[instrument(skip(self))]
    async fn apply_move_locked(&self, game_id: &str, raw: &str) -> Result<MoveReply, StoreError> {
        let mut attempt = 0;
        loop {
            let record = self.load(game_id).await?;
            let mut session = GameSession::restore(self.engine.clone(), record.state())?;
            let outcome = session.apply_move(raw);

            let written = match outcome {
                MoveOutcome::Unchanged => {
                    debug!(game_id, "Move token ignored");
                    return Ok(MoveReply::new(outcome, record.view(game_id)));
                }
                MoveOutcome::Applied(_) => {
                    let next = SessionRecord::from_state(session.state());
                    self.store
                        .compare_and_set(game_id, record.version, next)
                        .await
                        .map(|stored| (stored, ChangeKind::Moved))
                }
                MoveOutcome::Rejected(_) => {
                    let patch =
                        SessionPatch::rejection(&session.state()).with_if_version(record.version);
                    self.store
                        .update(game_id, patch)
                        .await
                        .map(|stored| (stored, ChangeKind::Rejected))
                }
            };

            match written {
                Ok((stored, change)) => {
                    info!(game_id, ?outcome, version = stored.version, "Move processed");
                    self.publish(game_id, stored.version, change);
                    return Ok(MoveReply::new(outcome, stored.view(game_id)));
                }
                Err(e) if e.kind == StoreErrorKind::Conflict && attempt < self.max_conflict_retries => {
                    attempt += 1;
                    warn!(game_id, attempt, "Version conflict, re-validating move");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Puts a game back at the starting position and clears its guard.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown game, `Conflict` once the retries are used up.
    #[instrument(skip(self))]
    pub async fn reset(&self, game_id: &str) -> Result<GameView, StoreError> {
        let lock = self.lock_for(game_id);
        let result = {
            let _guard = lock.lock().await;
            self.reset_locked(game_id).await
        };
        if matches!(&result, Err(e) if e.kind == StoreErrorKind::NotFound) {
            self.release_lock(game_id, lock);
        }
        result
    }

    #[instrument(skip(self))]
    async fn reset_locked(&self, game_id: &str) -> Result<GameView, StoreError> {
        let mut attempt = 0;
        loop {
            let record = self.load(game_id).await?;
            let fresh = SessionRecord::from_state(GameSession::new(self.engine.clone()).state());
            match self
                .store
                .compare_and_set(game_id, record.version, fresh)
                .await
            {
                Ok(stored) => {
                    info!(game_id, version = stored.version, "Game reset");
                    self.publish(game_id, stored.version, ChangeKind::Reset);
                    return Ok(stored.view(game_id));
                }
                Err(e) if e.kind == StoreErrorKind::Conflict && attempt < self.max_conflict_retries => {
                    attempt += 1;
                    warn!(game_id, attempt, "Version conflict during reset");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Deletes a game. Returns whether it existed.
    #[instrument(skip(self))]
    pub async fn remove(&self, game_id: &str) -> Result<bool, StoreError> {
        let lock = self.lock_for(game_id);
        let removed = {
            let _guard = lock.lock().await;
            self.store.remove(game_id).await
        };
        self.release_lock(game_id, lock);
        let removed = removed?;
        if removed {
            info!(game_id, "Game removed");
            self.publish(game_id, 0, ChangeKind::Removed);
        }
        Ok(removed)
    }

    /// All stored game identifiers.
    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<GameId>, StoreError> {
        self.store.list().await
    }

    /// Receiver for every write made through this manager.
    #[instrument(skip(self))]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Waits until the game's version exceeds `since`, or `timeout` elapses.
    ///
    /// Returns the latest view either way. Local writes wake the wait at
    /// once; writes from other processes are seen at the next re-read.
    ///
    /// # Errors
    ///
    /// `NotFound` if the game does not exist (or is removed while waiting).
    #[instrument(skip(self))]
    pub async fn wait_for_change(
        &self,
        game_id: &str,
        since: u64,
        timeout: Duration,
    ) -> Result<GameView, StoreError> {
        let mut events = self.subscribe();
        let deadline = Instant::now() + timeout;

        loop {
            let view = self.view(game_id).await?;
            if view.version > since {
                return Ok(view);
            }

            let now = Instant::now();
            if now >= deadline {
                debug!(game_id, since, "Long poll timed out");
                return Ok(view);
            }
            let wait = self.recheck_interval.min(deadline - now);

            match tokio::time::timeout(wait, events.recv()).await {
                Ok(Ok(event)) if event.game_id != game_id => {}
                Ok(Ok(event)) => debug!(game_id, version = event.version, "Change observed"),
                Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                    debug!(skipped, "Event receiver lagged");
                }
                Ok(Err(broadcast::error::RecvError::Closed)) | Err(_) => {}
            }
        }
    }
}
