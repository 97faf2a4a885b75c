//! Turn invariant: the tracked turn agrees with the position.

use super::Invariant;
use crate::rules::RulesEngine;
use crate::session::GameSession;

/// Invariant: `turn` equals the side to move encoded in `position`.
pub struct TurnMatchesPosition;

impl<E: RulesEngine> Invariant<GameSession<E>> for TurnMatchesPosition {
    fn holds(session: &GameSession<E>) -> bool {
        session.turn() == session.engine().side_to_move(session.position())
    }

    fn description() -> &'static str {
        "Tracked turn matches the side to move in the position"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChessSession;

    #[test]
    fn test_holds_through_a_game() {
        let mut session = ChessSession::default();
        assert!(TurnMatchesPosition::holds(&session));
        for token in ["d2d4", "d7d5", "c2c4", "e7e6"] {
            session.apply_move(token);
            assert!(TurnMatchesPosition::holds(&session));
        }
    }

    #[test]
    fn test_holds_after_rejection() {
        let mut session = ChessSession::default();
        session.apply_move("e2e5");
        session.apply_move("z9z9");
        assert!(TurnMatchesPosition::holds(&session));
    }
}
