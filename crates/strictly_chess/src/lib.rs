//! Strictly Chess - authoritative chess game sessions
//!
//! This library owns the state machine of a two-player chess game: board
//! state, turn order, the move-validation entry point and game-termination
//! detection. Chess rules are delegated to a [`RulesEngine`]; the bundled
//! [`ShakmatyEngine`] uses the `shakmaty` crate.
//!
//! # Example
//!
//! ```
//! use strictly_chess::{ChessSession, Color, GameStatus, MoveOutcome};
//!
//! let mut session = ChessSession::default();
//! assert!(session.apply_move("e2-e4").is_applied());
//! assert_eq!(session.turn(), Color::Black);
//! assert_eq!(session.apply_move("e2-e4"), MoveOutcome::Unchanged);
//! assert_eq!(session.status(), GameStatus::InProgress);
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod classify;
mod contracts;
mod invariants;
mod notation;
mod rules;
mod session;
mod types;

// Crate-level exports - Rules engine
pub use rules::{ChessPosition, RulesEngine, RulesError, ShakmatyEngine};

// Crate-level exports - Session state machine
pub use session::{ChessSession, GameSession};

// Crate-level exports - Classification and normalization
pub use classify::{classify, classify_position};
pub use notation::{SQUARE_SEPARATOR, normalize};

// Crate-level exports - Contracts and invariants
pub use contracts::{FreshInput, Ignored, MoveContract, NonEmptyInput, SessionOpen};
pub use invariants::{
    FinishedPositionIsTerminal, Invariant, InvariantSet, InvariantViolation, SessionInvariants,
    TurnMatchesPosition,
};

// Crate-level exports - Domain types
pub use types::{
    Color, GameStatus, ILLEGAL_MOVE_MESSAGE, INVALID_FORMAT_MESSAGE, MoveOutcome, RejectReason,
    SessionSnapshot, SessionState,
};
