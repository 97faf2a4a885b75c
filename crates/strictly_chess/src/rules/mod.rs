//! Rules engine capability.
//!
//! The session never decides chess legality itself. Everything about the
//! rules (parsing addresses, legal moves, applying moves, termination
//! predicates, FEN) sits behind [`RulesEngine`].

mod shakmaty_engine;

pub use shakmaty_engine::{ChessPosition, ShakmatyEngine};

use crate::types::Color;
use derive_more::{Display, Error};
use std::fmt::Debug;

/// Errors raised by a rules engine.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum RulesError {
    /// The position encoding could not be decoded.
    #[display("invalid FEN '{}': {}", fen, reason)]
    InvalidFen {
        /// The offending encoding.
        fen: String,
        /// Engine explanation.
        reason: String,
    },

    /// The move address is malformed.
    #[display("invalid move address '{}'", _0)]
    InvalidMove(#[error(not(source))] String),

    /// The move is not legal in the position it was applied to.
    #[display("illegal move '{}'", _0)]
    IllegalMove(#[error(not(source))] String),
}

/// Chess rules as a capability.
///
/// Positions are values: [`RulesEngine::apply`] returns a new position and
/// leaves the input untouched, so a session always holds exactly one current
/// position and can commit or discard a candidate atomically.
pub trait RulesEngine: Clone + Debug + Send + Sync + 'static {
    /// Full board state.
    type Position: Clone + Debug + Send + Sync;
    /// Structured move address.
    type Move: Clone + Debug + PartialEq + Send + Sync;

    /// Standard starting position.
    fn starting_position(&self) -> Self::Position;

    /// Parses a normalized address into a move.
    ///
    /// # Errors
    ///
    /// Returns [`RulesError::InvalidMove`] for malformed addresses, unknown
    /// squares, bad promotion letters or a move onto its own square.
    fn parse_move(&self, addr: &str, position: &Self::Position) -> Result<Self::Move, RulesError>;

    /// Every legal move in `position`.
    fn legal_moves(&self, position: &Self::Position) -> Vec<Self::Move>;

    /// Membership test against the legal-move set.
    fn is_legal(&self, position: &Self::Position, mv: &Self::Move) -> bool {
        self.legal_moves(position).contains(mv)
    }

    /// Plays `mv` and returns the resulting position.
    ///
    /// # Errors
    ///
    /// Returns [`RulesError::IllegalMove`] if `mv` is not legal in `position`.
    fn apply(&self, position: &Self::Position, mv: &Self::Move)
    -> Result<Self::Position, RulesError>;

    /// Side to move in `position`.
    fn side_to_move(&self, position: &Self::Position) -> Color;

    /// Side to move is mated.
    fn is_checkmate(&self, position: &Self::Position) -> bool;

    /// Side to move has no legal move and is not in check.
    fn is_stalemate(&self, position: &Self::Position) -> bool;

    /// Neither side can mate.
    fn is_insufficient_material(&self, position: &Self::Position) -> bool;

    /// Any automatic game end, including the three predicates above.
    fn is_game_over(&self, position: &Self::Position) -> bool;

    /// Canonical text encoding (FEN).
    fn encode(&self, position: &Self::Position) -> String;

    /// Decodes a canonical text encoding.
    ///
    /// # Errors
    ///
    /// Returns [`RulesError::InvalidFen`] if the text is not a valid position.
    fn decode(&self, encoding: &str) -> Result<Self::Position, RulesError>;

    /// Position history the encoding does not carry, oldest first.
    fn history(&self, _position: &Self::Position) -> Vec<String> {
        Vec::new()
    }

    /// Decodes `encoding` and restores the history returned by [`Self::history`].
    ///
    /// # Errors
    ///
    /// Returns [`RulesError::InvalidFen`] if the text is not a valid position.
    fn decode_with_history(
        &self,
        encoding: &str,
        _history: &[String],
    ) -> Result<Self::Position, RulesError> {
        self.decode(encoding)
    }
}
