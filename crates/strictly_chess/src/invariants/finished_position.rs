//! Status invariant: a finished position is never reported as running.

use super::Invariant;
use crate::classify::classify_position;
use crate::rules::RulesEngine;
use crate::session::GameSession;

/// Invariant: if the engine classifies the position as finished, the session
/// status is exactly that classification.
///
/// The converse does not hold: a restored session can carry a terminal
/// status (fivefold repetition) that its FEN alone no longer shows.
pub struct FinishedPositionIsTerminal;

impl<E: RulesEngine> Invariant<GameSession<E>> for FinishedPositionIsTerminal {
    fn holds(session: &GameSession<E>) -> bool {
        let classified = classify_position(session.engine(), session.position());
        !classified.is_terminal() || classified == session.status()
    }

    fn description() -> &'static str {
        "A finished position carries its terminal status"
    }
}
