//! Polling a shared game with backoff.
//!
//! Observers that cannot receive pushed updates (another process, a remote
//! client) poll a [`SnapshotSource`]. The interval doubles while nothing
//! changes and drops back to the minimum as soon as something does.

use crate::error::StoreError;
use crate::manager::SessionManager;
use crate::store::{GameView, StateStore};
use async_trait::async_trait;
use std::time::Duration;
use strictly_chess::RulesEngine;
use tracing::{debug, instrument, warn};

/// Bounded exponential refresh interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    min: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    /// Starts at `min`; `max` is raised to `min` if smaller.
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max: max.max(min),
            current: min,
        }
    }

    /// Delay that the next idle round will wait.
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Returns the delay to wait now and doubles the next one, up to the cap.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    /// Back to the minimum interval.
    pub fn reset(&mut self) {
        self.current = self.min;
    }
}

/// Anything a game view can be fetched from.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Failure type of a fetch.
    type Error: std::fmt::Display + Send;

    /// Fetches the latest view of `game_id`.
    async fn fetch(&self, game_id: &str) -> Result<GameView, Self::Error>;
}

#[async_trait]
impl<S: StateStore> SnapshotSource for S {
    type Error = StoreError;

    async fn fetch(&self, game_id: &str) -> Result<GameView, StoreError> {
        self.get(game_id)
            .await?
            .map(|record| record.view(game_id))
            .ok_or_else(|| StoreError::not_found(game_id))
    }
}

#[async_trait]
impl<E: RulesEngine> SnapshotSource for SessionManager<E> {
    type Error = StoreError;

    async fn fetch(&self, game_id: &str) -> Result<GameView, StoreError> {
        self.view(game_id).await
    }
}

/// Yields each new version of one game.
#[derive(Debug)]
pub struct SnapshotPoller<S> {
    source: S,
    game_id: String,
    backoff: Backoff,
    last_version: u64,
    pending: Option<Duration>,
}

impl<S: SnapshotSource> SnapshotPoller<S> {
    /// Polls `game_id` on `source`, starting from "nothing seen yet".
    pub fn new(source: S, game_id: impl Into<String>, backoff: Backoff) -> Self {
        Self {
            source,
            game_id: game_id.into(),
            backoff,
            last_version: 0,
            pending: None,
        }
    }

    /// Version of the last view returned.
    pub fn last_version(&self) -> u64 {
        self.last_version
    }

    /// Current backoff state.
    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// Waits for a version newer than the last one returned.
    ///
    /// A failed fetch is returned right away; the backoff still grows, and
    /// the next call waits out the delay before fetching again.
    ///
    /// # Errors
    ///
    /// Whatever the source's fetch fails with.
    #[instrument(skip(self), fields(game_id = %self.game_id, since = self.last_version))]
    pub async fn next_change(&mut self) -> Result<GameView, S::Error> {
        if let Some(delay) = self.pending.take() {
            tokio::time::sleep(delay).await;
        }

        loop {
            match self.source.fetch(&self.game_id).await {
                Ok(view) if view.version > self.last_version => {
                    debug!(version = view.version, "New version observed");
                    self.last_version = view.version;
                    self.backoff.reset();
                    return Ok(view);
                }
                Ok(_) => {
                    let delay = self.backoff.next_delay();
                    debug!(delay_ms = delay.as_millis() as u64, "No change, backing off");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    let delay = self.backoff.next_delay();
                    warn!(error = %e, delay_ms = delay.as_millis() as u64, "Fetch failed");
                    self.pending = Some(delay);
                    return Err(e);
                }
            }
        }
    }
}
