//! Error types for the session store and server configuration.

use derive_more::{Display, Error};
use strictly_chess::RulesError;
use tracing::instrument;

/// Category of a store failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum StoreErrorKind {
    /// No record under the requested identifier.
    #[display("not found")]
    NotFound,
    /// A record was created concurrently under the same identifier.
    #[display("already exists")]
    AlreadyExists,
    /// The record version moved on since it was read.
    #[display("version conflict")]
    Conflict,
    /// The stored record cannot be turned back into a session.
    #[display("corrupt record")]
    Corrupt,
    /// The backend itself failed (connection, I/O, task).
    #[display("backend failure")]
    Backend,
}

/// Store error with location tracking.
#[derive(Debug, Clone, Display, Error)]
#[display("Store error ({}): {} at {}:{}", kind, message, file, line)]
pub struct StoreError {
    /// Failure category.
    pub kind: StoreErrorKind,
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl StoreError {
    /// Creates a new store error with caller location tracking.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            kind,
            message: message.into(),
            line: loc.line(),
            file: loc.file(),
        }
    }

    /// No record for `game_id`.
    #[track_caller]
    pub fn not_found(game_id: &str) -> Self {
        Self::new(
            StoreErrorKind::NotFound,
            format!("No session '{}'", game_id),
        )
    }

    /// Compare-and-set lost against another writer.
    #[track_caller]
    pub fn conflict(game_id: &str, expected: u64) -> Self {
        Self::new(
            StoreErrorKind::Conflict,
            format!("Session '{}' is no longer at version {}", game_id, expected),
        )
    }

    /// Creation raced with another creator.
    #[track_caller]
    pub fn already_exists(game_id: &str) -> Self {
        Self::new(
            StoreErrorKind::AlreadyExists,
            format!("Session '{}' already exists", game_id),
        )
    }

    /// Stored data is unreadable.
    #[track_caller]
    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Corrupt, message)
    }

    /// Backend failure.
    #[track_caller]
    pub fn backend(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Backend, message)
    }

    /// True for failures a caller may retry after re-reading.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            StoreErrorKind::Conflict | StoreErrorKind::AlreadyExists
        )
    }
}

impl From<diesel::result::Error> for StoreError {
    #[track_caller]
    fn from(err: diesel::result::Error) -> Self {
        match err {
            diesel::result::Error::NotFound => {
                Self::new(StoreErrorKind::NotFound, "Diesel error: record not found")
            }
            diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                info,
            ) => Self::new(
                StoreErrorKind::AlreadyExists,
                format!("Diesel error: {}", info.message()),
            ),
            other => Self::backend(format!("Diesel error: {}", other)),
        }
    }
}

impl From<diesel::ConnectionError> for StoreError {
    #[track_caller]
    fn from(err: diesel::ConnectionError) -> Self {
        Self::backend(format!("Connection error: {}", err))
    }
}

impl From<tokio::task::JoinError> for StoreError {
    #[track_caller]
    fn from(err: tokio::task::JoinError) -> Self {
        Self::backend(format!("Blocking task failed: {}", err))
    }
}

impl From<RulesError> for StoreError {
    #[track_caller]
    fn from(err: RulesError) -> Self {
        Self::corrupt(format!("Stored position rejected: {}", err))
    }
}

/// Configuration error.
#[derive(Debug, Clone, Display, Error)]
#[display("Config error: {} at {}:{}", message, file, line)]
pub struct ConfigError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message: message.into(),
            line: loc.line(),
            file: loc.file(),
        }
    }
}
