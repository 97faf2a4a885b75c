//! Shared session storage.
//!
//! A [`StateStore`] holds one [`SessionRecord`] per game identifier. Every
//! write bumps the record's `version`; [`StateStore::compare_and_set`] only
//! succeeds against the version the writer last saw, which is what keeps two
//! processes from both applying a move to the same pre-move position.

mod memory;
mod models;
mod schema;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use derive_setters::Setters;
use serde::{Deserialize, Serialize};
use strictly_chess::{Color, GameStatus, SessionSnapshot, SessionState};
use tracing::instrument;

/// Identifier of one shared game.
pub type GameId = String;

/// Persisted form of one game session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// FEN of the current position.
    pub position_encoding: String,
    /// Side to move, as a flag.
    pub white_to_move: bool,
    /// Game status.
    pub status: GameStatus,
    /// Last validation message or end-of-game announcement.
    pub status_message: String,
    /// Raw token last consumed.
    pub last_processed_input: Option<String>,
    /// Write counter; 0 is never stored.
    pub version: u64,
    /// Time of the last write.
    pub last_updated: NaiveDateTime,
    /// Repetition keys since the last irreversible move, current last.
    #[serde(default)]
    pub position_history: Vec<String>,
}

impl SessionRecord {
    /// Builds an unversioned record from a session state. The store assigns
    /// the version when the record is written.
    #[instrument(skip(state), fields(fen = %state.snapshot.position_encoding))]
    pub fn from_state(state: SessionState) -> Self {
        let SessionState {
            snapshot,
            last_processed_input,
            position_history,
        } = state;
        Self {
            position_encoding: snapshot.position_encoding,
            white_to_move: snapshot.turn.is_white(),
            status: snapshot.status,
            status_message: snapshot.status_message,
            last_processed_input,
            version: 0,
            last_updated: Utc::now().naive_utc(),
            position_history,
        }
    }

    /// Presentation fields.
    #[instrument(skip(self))]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            position_encoding: self.position_encoding.clone(),
            turn: Color::from_white_flag(self.white_to_move),
            status: self.status,
            status_message: self.status_message.clone(),
        }
    }

    /// State a session can be restored from.
    #[instrument(skip(self))]
    pub fn state(&self) -> SessionState {
        SessionState {
            snapshot: self.snapshot(),
            last_processed_input: self.last_processed_input.clone(),
            position_history: self.position_history.clone(),
        }
    }

    /// Transport view of this record.
    pub fn view(&self, game_id: &str) -> GameView {
        GameView {
            game_id: game_id.to_string(),
            version: self.version,
            snapshot: self.snapshot(),
            last_updated: self.last_updated,
        }
    }

    /// Returns a copy stamped with `version` and the current time.
    pub(crate) fn stamped(&self, version: u64) -> Self {
        Self {
            version,
            last_updated: Utc::now().naive_utc(),
            ..self.clone()
        }
    }
}

/// What clients see of a game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameView {
    /// Game identifier.
    pub game_id: GameId,
    /// Record version the view was taken at.
    pub version: u64,
    /// Board, turn, status and message.
    #[serde(flatten)]
    pub snapshot: SessionSnapshot,
    /// Time of the last write.
    pub last_updated: NaiveDateTime,
}

/// Partial update of a record.
///
/// Unset fields are left alone. With `if_version` set, the update fails
/// with a conflict unless the stored version matches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Setters)]
#[setters(strip_option, prefix = "with_")]
pub struct SessionPatch {
    /// New position.
    pub position_encoding: Option<String>,
    /// New side to move.
    pub white_to_move: Option<bool>,
    /// New status.
    pub status: Option<GameStatus>,
    /// New message.
    pub status_message: Option<String>,
    /// New last input; `Some(None)` clears it.
    pub last_processed_input: Option<Option<String>>,
    /// Version guard.
    pub if_version: Option<u64>,
}

impl SessionPatch {
    /// Patch carrying only the rejection fields of `state`.
    pub fn rejection(state: &SessionState) -> Self {
        Self::default()
            .with_status_message(state.snapshot.status_message.clone())
            .with_last_processed_input(state.last_processed_input.clone())
    }

    /// Writes the set fields into `record`. Does not touch the version.
    pub fn apply_to(&self, record: &mut SessionRecord) {
        if let Some(position) = &self.position_encoding {
            record.position_encoding = position.clone();
        }
        if let Some(white) = self.white_to_move {
            record.white_to_move = white;
        }
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(message) = &self.status_message {
            record.status_message = message.clone();
        }
        if let Some(input) = &self.last_processed_input {
            record.last_processed_input = input.clone();
        }
    }
}

/// Storage boundary for shared sessions.
///
/// Implementations must make `compare_and_set` and guarded `update` atomic
/// with respect to every other writer of the same backend.
#[async_trait]
pub trait StateStore: Send + Sync + std::fmt::Debug {
    /// Reads a record, `None` if absent.
    async fn get(&self, game_id: &str) -> Result<Option<SessionRecord>, StoreError>;

    /// Unconditional upsert. Returns the stored record with its new version.
    async fn set(&self, game_id: &str, record: SessionRecord)
    -> Result<SessionRecord, StoreError>;

    /// Applies a partial update and bumps the version.
    ///
    /// Fails with `NotFound` if absent and `Conflict` on a version-guard miss.
    async fn update(
        &self,
        game_id: &str,
        patch: SessionPatch,
    ) -> Result<SessionRecord, StoreError>;

    /// Writes `record` only if the stored version equals `expected_version`.
    ///
    /// `expected_version == 0` means the record must not exist yet; a racing
    /// creation then fails with `AlreadyExists`. Any other mismatch is a
    /// `Conflict`.
    async fn compare_and_set(
        &self,
        game_id: &str,
        expected_version: u64,
        record: SessionRecord,
    ) -> Result<SessionRecord, StoreError>;

    /// All stored identifiers, sorted.
    async fn list(&self) -> Result<Vec<GameId>, StoreError>;

    /// Deletes a record. Returns whether one existed.
    async fn remove(&self, game_id: &str) -> Result<bool, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use strictly_chess::ChessSession;

    #[test]
    fn test_record_round_trips_state() {
        let mut session = ChessSession::default();
        session.apply_move("e2e4");
        session.apply_move("e2e4");
        let state = session.state();

        let record = SessionRecord::from_state(state.clone());
        assert_eq!(record.position_history.len(), 1);
        assert_eq!(record.version, 0);
        assert!(!record.white_to_move);
        assert_eq!(record.state(), state);
    }

    #[test]
    fn test_patch_applies_only_set_fields() {
        let mut record = SessionRecord::from_state(ChessSession::default().state());
        let before = record.clone();

        SessionPatch::default()
            .with_status_message("Illegal move! Try again.".to_string())
            .with_last_processed_input(Some("e2e5".to_string()))
            .apply_to(&mut record);

        assert_eq!(record.position_encoding, before.position_encoding);
        assert_eq!(record.status, before.status);
        assert_eq!(record.status_message, "Illegal move! Try again.");
        assert_eq!(record.last_processed_input.as_deref(), Some("e2e5"));
    }

    #[test]
    fn test_patch_can_clear_last_input() {
        let mut session = ChessSession::default();
        session.apply_move("e2e4");
        let mut record = SessionRecord::from_state(session.state());

        SessionPatch::default()
            .with_last_processed_input(None)
            .apply_to(&mut record);
        assert_eq!(record.last_processed_input, None);
    }

    #[test]
    fn test_view_serializes_flat() {
        let record = SessionRecord::from_state(ChessSession::default().state()).stamped(4);
        let json = serde_json::to_value(record.view("g1")).unwrap();
        assert_eq!(json["game_id"], "g1");
        assert_eq!(json["version"], 4);
        assert_eq!(json["turn"], "white");
        assert_eq!(json["status"]["state"], "in_progress");
    }
}
