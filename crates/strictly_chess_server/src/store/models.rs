//! Database row model for stored sessions.

use chrono::NaiveDateTime;
use derive_getters::Getters;
use diesel::prelude::*;
use strictly_chess::GameStatus;
use tracing::instrument;

use super::SessionRecord;
use super::schema;
use crate::error::StoreError;

/// One row of `game_sessions`.
#[derive(
    Debug, Clone, Queryable, Selectable, Insertable, Identifiable, AsChangeset, Getters,
)]
#[diesel(table_name = schema::game_sessions)]
#[diesel(primary_key(game_id))]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct GameSessionRow {
    game_id: String,
    position_encoding: String,
    white_to_move: bool,
    status: String,
    status_message: String,
    last_processed_input: Option<String>,
    version: i64,
    last_updated: NaiveDateTime,
    /// JSON array of repetition keys.
    position_history: String,
}

impl GameSessionRow {
    /// Row for `record` under `game_id`.
    ///
    /// # Errors
    ///
    /// Fails if the version does not fit a signed 64-bit column.
    #[instrument(skip(record), fields(version = record.version))]
    pub fn from_record(game_id: &str, record: &SessionRecord) -> Result<Self, StoreError> {
        let version = i64::try_from(record.version)
            .map_err(|_| StoreError::backend(format!("Version {} overflows", record.version)))?;
        let position_history = serde_json::to_string(&record.position_history)
            .map_err(|e| StoreError::backend(format!("Position history not encodable: {e}")))?;
        Ok(Self {
            game_id: game_id.to_string(),
            position_encoding: record.position_encoding.clone(),
            white_to_move: record.white_to_move,
            status: record.status.to_db_string().to_string(),
            status_message: record.status_message.clone(),
            last_processed_input: record.last_processed_input.clone(),
            version,
            last_updated: record.last_updated,
            position_history,
        })
    }

    /// Parses the row back into a record.
    ///
    /// # Errors
    ///
    /// Returns a `Corrupt` error for an unknown status string, a negative
    /// version or a position history that is not a JSON string array.
    #[instrument(skip(self), fields(game_id = %self.game_id))]
    pub fn into_record(self) -> Result<SessionRecord, StoreError> {
        let status = GameStatus::from_db_string(&self.status).ok_or_else(|| {
            StoreError::corrupt(format!(
                "Unknown status '{}' for session '{}'",
                self.status, self.game_id
            ))
        })?;
        let version = u64::try_from(self.version).map_err(|_| {
            StoreError::corrupt(format!(
                "Negative version {} for session '{}'",
                self.version, self.game_id
            ))
        })?;
        let position_history: Vec<String> = serde_json::from_str(&self.position_history)
            .map_err(|e| {
                StoreError::corrupt(format!(
                    "Bad position history for session '{}': {e}",
                    self.game_id
                ))
            })?;
        Ok(SessionRecord {
            position_encoding: self.position_encoding,
            white_to_move: self.white_to_move,
            status,
            status_message: self.status_message,
            last_processed_input: self.last_processed_input,
            version,
            last_updated: self.last_updated,
            position_history,
        })
    }
}
