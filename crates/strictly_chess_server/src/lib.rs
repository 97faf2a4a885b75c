//! Strictly Chess Server - shared chess sessions
//!
//! Stores [`strictly_chess`] sessions behind a [`StateStore`] so several
//! observers and players can share one game. The [`SessionManager`] keeps
//! concurrent submissions from both being applied to the same position, the
//! REST [`router`] exposes it over HTTP, and [`SnapshotPoller`] follows a game
//! from anywhere with a bounded backoff.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod api;
mod board;
mod cli;
mod client;
mod config;
mod error;
mod manager;
mod store;
mod sync;

// Crate-level exports - Storage
pub use store::{
    GameId, GameView, MemoryStore, SessionPatch, SessionRecord, SqliteStore, StateStore,
};

// Crate-level exports - Session coordination
pub use manager::{
    ChangeKind, DEFAULT_MAX_CONFLICT_RETRIES, DEFAULT_RECHECK_INTERVAL, MoveReply,
    SessionEvent, SessionManager,
};
pub use sync::{Backoff, SnapshotPoller, SnapshotSource};

// Crate-level exports - HTTP
pub use api::{ApiError, AppState, ErrorBody, GameQuery, MoveRequest, router};
pub use client::{ClientError, RestGameClient};

// Crate-level exports - Presentation, CLI and configuration
pub use board::{render_board, render_snapshot, render_view};
pub use cli::{Cli, Command};
pub use config::{ENV_PREFIX, ServerConfig, StoreKind};
pub use error::{ConfigError, StoreError, StoreErrorKind};
