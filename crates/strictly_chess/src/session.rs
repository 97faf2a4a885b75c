//! The game-session state machine.
//!
//! A [`GameSession`] owns one game: the current position, the side to move,
//! the status, the idempotence guard and the last validation message.
//! [`GameSession::apply_move`] is the only way any of those change, and it
//! commits them together.

use crate::classify::{classify, classify_position};
use crate::contracts::MoveContract;
use crate::notation::normalize;
use crate::rules::{RulesEngine, RulesError, ShakmatyEngine};
use crate::types::{
    Color, GameStatus, MoveOutcome, RejectReason, SessionSnapshot, SessionState,
};
use tracing::{debug, info, instrument, warn};

/// Session over the `shakmaty` engine.
pub type ChessSession = GameSession<ShakmatyEngine>;

/// One game's mutable state.
#[derive(Debug, Clone)]
pub struct GameSession<E: RulesEngine> {
    engine: E,
    position: E::Position,
    turn: Color,
    status: GameStatus,
    last_processed_input: Option<String>,
    status_message: String,
}

impl<E: RulesEngine> GameSession<E> {
    /// Creates a session at the standard starting position.
    #[instrument]
    pub fn new(engine: E) -> Self {
        let position = engine.starting_position();
        let turn = engine.side_to_move(&position);
        debug!(%turn, "Creating new game session");
        Self {
            engine,
            position,
            turn,
            status: GameStatus::InProgress,
            last_processed_input: None,
            status_message: String::new(),
        }
    }

    /// Creates a session from an arbitrary position.
    ///
    /// The position is classified right away, so a mate or stalemate fixture
    /// starts out terminal.
    ///
    /// # Errors
    ///
    /// Returns [`RulesError::InvalidFen`] if `fen` does not decode.
    #[instrument]
    pub fn from_fen(engine: E, fen: &str) -> Result<Self, RulesError> {
        let position = engine.decode(fen)?;
        let turn = engine.side_to_move(&position);
        let status = classify_position(&engine, &position);
        info!(%turn, ?status, "Loaded session from FEN");
        Ok(Self {
            engine,
            position,
            turn,
            status,
            last_processed_input: None,
            status_message: status.announcement(),
        })
    }

    /// Rebuilds a session from persisted state.
    ///
    /// The turn is always re-derived from the position, and the stored
    /// position history is handed back to the engine. A stored terminal
    /// status is kept as is; otherwise the position is classified again.
    ///
    /// # Errors
    ///
    /// Returns [`RulesError::InvalidFen`] if the stored encoding does not decode.
    #[instrument(skip(state), fields(fen = %state.snapshot.position_encoding))]
    pub fn restore(engine: E, state: SessionState) -> Result<Self, RulesError> {
        let SessionState {
            snapshot,
            last_processed_input,
            position_history,
        } = state;

        let position =
            engine.decode_with_history(&snapshot.position_encoding, &position_history)?;
        let turn = engine.side_to_move(&position);
        if turn != snapshot.turn {
            warn!(
                stored = %snapshot.turn,
                derived = %turn,
                "Stored turn disagrees with position, using position"
            );
        }

        let (status, status_message) = if snapshot.status.is_terminal() {
            (snapshot.status, snapshot.status_message)
        } else {
            let status = classify_position(&engine, &position);
            if status.is_terminal() {
                (status, status.announcement())
            } else {
                (status, snapshot.status_message)
            }
        };

        Ok(Self {
            engine,
            position,
            turn,
            status,
            last_processed_input,
            status_message,
        })
    }

    /// Validates and plays a raw move token.
    ///
    /// Accepts `e2e4`, `e7e8q` and the hyphenated `e2-e4`. Returns
    /// [`MoveOutcome::Unchanged`] without touching anything when the game is
    /// over, the token is empty, or it equals the last processed token.
    /// Every other call records the token, whatever the outcome.
    #[instrument(skip(self), fields(turn = %self.turn, status = ?self.status))]
    pub fn apply_move(&mut self, raw: &str) -> MoveOutcome {
        if let Err(reason) = MoveContract::pre(self, raw) {
            debug!(%reason, "Ignoring move token");
            return MoveOutcome::Unchanged;
        }

        let addr = normalize(raw);
        let mv = match self.engine.parse_move(&addr, &self.position) {
            Ok(mv) => mv,
            Err(e) => {
                debug!(error = %e, "Move token did not parse");
                return self.reject(raw, RejectReason::InvalidFormat);
            }
        };

        if !self.engine.is_legal(&self.position, &mv) {
            debug!(?mv, "Move not in legal set");
            return self.reject(raw, RejectReason::Illegal);
        }

        let next = match self.engine.apply(&self.position, &mv) {
            Ok(next) => next,
            Err(e) => {
                warn!(error = %e, "Engine refused a move it listed as legal");
                return self.reject(raw, RejectReason::Illegal);
            }
        };

        let mover = self.turn;
        let status = classify(&self.engine, &next, mover);

        self.position = next;
        self.turn = mover.opponent();
        self.status = status;
        self.status_message = status.announcement();
        self.last_processed_input = Some(raw.to_string());

        debug_assert!(
            MoveContract::post(self).is_ok(),
            "Move postcondition violated after {raw:?}"
        );

        info!(
            mover = %mover,
            ?status,
            fen = %self.engine.encode(&self.position),
            "Move applied"
        );
        MoveOutcome::Applied(status)
    }

    fn reject(&mut self, raw: &str, reason: RejectReason) -> MoveOutcome {
        self.status_message = reason.message().to_string();
        self.last_processed_input = Some(raw.to_string());
        info!(%reason, "Move rejected");
        MoveOutcome::Rejected(reason)
    }

    /// Replaces the whole session with a fresh one.
    #[instrument(skip(self))]
    pub fn reset(&mut self) {
        info!("Resetting game session");
        *self = Self::new(self.engine.clone());
    }

    /// Read-only projection for presentation and transport.
    #[instrument(skip(self))]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            position_encoding: self.engine.encode(&self.position),
            turn: self.turn,
            status: self.status,
            status_message: self.status_message.clone(),
        }
    }

    /// Snapshot plus idempotence guard and position history, for persistence.
    #[instrument(skip(self))]
    pub fn state(&self) -> SessionState {
        SessionState {
            snapshot: self.snapshot(),
            last_processed_input: self.last_processed_input.clone(),
            position_history: self.engine.history(&self.position),
        }
    }

    /// The rules engine.
    #[instrument(skip(self))]
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// The current position.
    #[instrument(skip(self))]
    pub fn position(&self) -> &E::Position {
        &self.position
    }

    /// Side to move.
    #[instrument(skip(self))]
    pub fn turn(&self) -> Color {
        self.turn
    }

    /// Game status.
    #[instrument(skip(self))]
    pub fn status(&self) -> GameStatus {
        self.status
    }

    /// True once the status is terminal.
    #[instrument(skip(self))]
    pub fn is_over(&self) -> bool {
        self.status.is_terminal()
    }

    /// Last validation message or end-of-game announcement.
    #[instrument(skip(self))]
    pub fn status_message(&self) -> &str {
        &self.status_message
    }

    /// Raw token last consumed.
    #[instrument(skip(self))]
    pub fn last_processed_input(&self) -> Option<&str> {
        self.last_processed_input.as_deref()
    }

    #[cfg(test)]
    pub(crate) fn corrupt_for_test(&mut self) {
        self.turn = self.turn.opponent();
        self.status = GameStatus::InProgress;
    }
}

impl<E: RulesEngine + Default> Default for GameSession<E> {
    fn default() -> Self {
        Self::new(E::default())
    }
}
