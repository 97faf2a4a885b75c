//! [`RulesEngine`] backed by `shakmaty`.

use super::{RulesEngine, RulesError};
use crate::types::Color;
use shakmaty::fen::Fen;
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, EnPassantMode, Position};
use tracing::{debug, instrument, warn};

/// Halfmove clock at which the game ends without a claim.
const SEVENTY_FIVE_MOVE_PLIES: u32 = 150;

/// Occurrences of the same position that end the game without a claim.
const FIVEFOLD: u8 = 5;

/// A `shakmaty` position plus the repetition history for the game so far.
///
/// The history holds one repetition key per position reached since the last
/// irreversible move, current position last.
#[derive(Debug, Clone)]
pub struct ChessPosition {
    chess: Chess,
    history: Vec<String>,
}

impl ChessPosition {
    fn new(chess: Chess) -> Self {
        let mut position = Self {
            chess,
            history: Vec::new(),
        };
        position.record_occurrence();
        position
    }

    /// The underlying `shakmaty` position.
    pub fn chess(&self) -> &Chess {
        &self.chess
    }

    /// How many times the current position has occurred.
    pub fn occurrences(&self) -> u8 {
        let key = self.repetition_key();
        let count = self.history.iter().filter(|seen| **seen == key).count();
        u8::try_from(count).unwrap_or(u8::MAX)
    }

    /// Repetition keys since the last irreversible move, current last.
    pub fn history(&self) -> &[String] {
        &self.history
    }

    // Placement, side to move, castling rights and en-passant square: the
    // first four FEN fields.
    fn repetition_key(&self) -> String {
        let fen = Fen::from_position(self.chess.clone(), EnPassantMode::Legal).to_string();
        fen.split(' ').take(4).collect::<Vec<_>>().join(" ")
    }

    fn record_occurrence(&mut self) {
        // A pawn move or capture resets the clock; nothing before it can recur.
        if self.chess.halfmoves() == 0 {
            self.history.clear();
        }
        let key = self.repetition_key();
        self.history.push(key);
    }
}

/// Rules engine implemented with `shakmaty` in standard chess mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShakmatyEngine;

impl ShakmatyEngine {
    /// Creates the engine.
    pub fn new() -> Self {
        Self
    }
}

impl From<shakmaty::Color> for Color {
    fn from(color: shakmaty::Color) -> Self {
        match color {
            shakmaty::Color::White => Color::White,
            shakmaty::Color::Black => Color::Black,
        }
    }
}

impl RulesEngine for ShakmatyEngine {
    type Position = ChessPosition;
    type Move = UciMove;

    #[instrument(skip(self))]
    fn starting_position(&self) -> ChessPosition {
        ChessPosition::new(Chess::default())
    }

    #[instrument(skip(self, _position))]
    fn parse_move(&self, addr: &str, _position: &ChessPosition) -> Result<UciMove, RulesError> {
        let mv = addr.parse::<UciMove>().map_err(|e| {
            debug!(addr, error = %e, "Unparseable move address");
            RulesError::InvalidMove(addr.to_string())
        })?;
        match mv {
            UciMove::Normal { from, to, .. } if from == to => {
                debug!(addr, "Origin and destination are the same square");
                Err(RulesError::InvalidMove(addr.to_string()))
            }
            mv => Ok(mv),
        }
    }

    #[instrument(skip(self, position))]
    fn legal_moves(&self, position: &ChessPosition) -> Vec<UciMove> {
        position
            .chess
            .legal_moves()
            .iter()
            .map(|m| UciMove::from_move(m, CastlingMode::Standard))
            .collect()
    }

    #[instrument(skip(self, position), fields(mv = %mv))]
    fn apply(&self, position: &ChessPosition, mv: &UciMove) -> Result<ChessPosition, RulesError> {
        let illegal = || RulesError::IllegalMove(mv.to_string());
        let m = mv.to_move(&position.chess).map_err(|_| illegal())?;
        if !position.chess.is_legal(&m) {
            return Err(illegal());
        }
        let chess = position.chess.clone().play(&m).map_err(|_| illegal())?;

        let mut next = ChessPosition {
            chess,
            history: position.history.clone(),
        };
        next.record_occurrence();
        Ok(next)
    }

    #[instrument(skip(self, position))]
    fn side_to_move(&self, position: &ChessPosition) -> Color {
        position.chess.turn().into()
    }

    #[instrument(skip(self, position))]
    fn is_checkmate(&self, position: &ChessPosition) -> bool {
        position.chess.is_checkmate()
    }

    #[instrument(skip(self, position))]
    fn is_stalemate(&self, position: &ChessPosition) -> bool {
        position.chess.is_stalemate()
    }

    #[instrument(skip(self, position))]
    fn is_insufficient_material(&self, position: &ChessPosition) -> bool {
        position.chess.is_insufficient_material()
    }

    #[instrument(skip(self, position))]
    fn is_game_over(&self, position: &ChessPosition) -> bool {
        position.chess.is_game_over()
            || position.chess.halfmoves() >= SEVENTY_FIVE_MOVE_PLIES
            || position.occurrences() >= FIVEFOLD
    }

    #[instrument(skip(self, position))]
    fn encode(&self, position: &ChessPosition) -> String {
        Fen::from_position(position.chess.clone(), EnPassantMode::Legal).to_string()
    }

    #[instrument(skip(self))]
    fn decode(&self, encoding: &str) -> Result<ChessPosition, RulesError> {
        let invalid = |reason: String| RulesError::InvalidFen {
            fen: encoding.to_string(),
            reason,
        };
        let fen: Fen = encoding.parse().map_err(|e| invalid(format!("{e}")))?;
        let chess: Chess = fen
            .into_position(CastlingMode::Standard)
            .map_err(|e| invalid(format!("{e}")))?;
        Ok(ChessPosition::new(chess))
    }

    #[instrument(skip(self, position))]
    fn history(&self, position: &ChessPosition) -> Vec<String> {
        position.history.clone()
    }

    #[instrument(skip(self, history), fields(entries = history.len()))]
    fn decode_with_history(
        &self,
        encoding: &str,
        history: &[String],
    ) -> Result<ChessPosition, RulesError> {
        let mut position = self.decode(encoding)?;
        let current = position.repetition_key();
        match history.last() {
            Some(last) if *last == current => position.history = history.to_vec(),
            Some(last) => {
                warn!(%last, %current, "History does not end at the position; starting fresh");
            }
            None => {}
        }
        Ok(position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

    fn play(engine: &ShakmatyEngine, position: &ChessPosition, addr: &str) -> ChessPosition {
        let mv = engine.parse_move(addr, position).unwrap();
        engine.apply(position, &mv).unwrap()
    }

    #[test]
    fn test_starting_position() {
        let engine = ShakmatyEngine::new();
        let pos = engine.starting_position();
        assert_eq!(engine.encode(&pos), START_FEN);
        assert_eq!(engine.side_to_move(&pos), Color::White);
        assert_eq!(engine.legal_moves(&pos).len(), 20);
        assert!(!engine.is_game_over(&pos));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let engine = ShakmatyEngine::new();
        let pos = engine.starting_position();
        for addr in ["z9z9", "e2", "", "e7e8x", "hello", "e2e2", "a7a7q"] {
            assert!(
                matches!(engine.parse_move(addr, &pos), Err(RulesError::InvalidMove(_))),
                "{addr} should not parse"
            );
        }
    }

    #[test]
    fn test_well_formed_but_illegal() {
        let engine = ShakmatyEngine::new();
        let pos = engine.starting_position();
        let mv = engine.parse_move("e2e5", &pos).unwrap();
        assert!(!engine.is_legal(&pos, &mv));
        assert!(matches!(engine.apply(&pos, &mv), Err(RulesError::IllegalMove(_))));
    }

    #[test]
    fn test_apply_leaves_input_untouched() {
        let engine = ShakmatyEngine::new();
        let pos = engine.starting_position();
        let next = play(&engine, &pos, "e2e4");
        assert_eq!(engine.encode(&pos), START_FEN);
        assert_eq!(engine.side_to_move(&next), Color::Black);
    }

    #[test]
    fn test_castling_address_is_legal() {
        let engine = ShakmatyEngine::new();
        let pos = engine
            .decode("r3k2r/pppppppp/8/8/8/8/PPPPPPPP/R3K2R w KQkq - 0 1")
            .unwrap();
        let mv = engine.parse_move("e1g1", &pos).unwrap();
        assert!(engine.is_legal(&pos, &mv));
    }

    #[test]
    fn test_promotion_requires_letter() {
        let engine = ShakmatyEngine::new();
        let pos = engine.decode("8/P7/8/8/8/8/8/4K2k w - - 0 1").unwrap();
        let bare = engine.parse_move("a7a8", &pos).unwrap();
        assert!(!engine.is_legal(&pos, &bare));
        let queen = engine.parse_move("a7a8q", &pos).unwrap();
        assert!(engine.is_legal(&pos, &queen));
    }

    #[test]
    fn test_termination_predicates() {
        let engine = ShakmatyEngine::new();

        let mate = engine
            .decode("rnb1kbnr/pppp1ppp/8/4p3/6Pq/5P2/PPPPP2P/RNBQKBNR w KQkq - 1 3")
            .unwrap();
        assert!(engine.is_checkmate(&mate));
        assert!(engine.is_game_over(&mate));

        let stalemate = engine.decode("8/8/8/8/8/6q1/5k2/7K w - - 0 1").unwrap();
        assert!(engine.is_stalemate(&stalemate));

        let bare_kings = engine.decode("8/8/8/4k3/8/8/8/4K3 w - - 0 1").unwrap();
        assert!(engine.is_insufficient_material(&bare_kings));
    }

    #[test]
    fn test_seventy_five_move_rule() {
        let engine = ShakmatyEngine::new();
        let pos = engine
            .decode("4k3/8/8/8/8/8/4P3/4K2R w K - 150 120")
            .unwrap();
        assert!(!engine.is_checkmate(&pos));
        assert!(!engine.is_insufficient_material(&pos));
        assert!(engine.is_game_over(&pos));
    }

    #[test]
    fn test_fivefold_repetition() {
        let engine = ShakmatyEngine::new();
        let mut pos = engine.starting_position();
        for _ in 0..4 {
            pos = play(&engine, &pos, "g1f3");
            pos = play(&engine, &pos, "g8f6");
            pos = play(&engine, &pos, "f3g1");
            pos = play(&engine, &pos, "f6g8");
        }
        assert_eq!(pos.occurrences(), 5);
        assert!(engine.is_game_over(&pos));
    }

    #[test]
    fn test_history_resets_after_pawn_move() {
        let engine = ShakmatyEngine::new();
        let pos = engine.starting_position();
        let knight = play(&engine, &pos, "g1f3");
        assert_eq!(knight.history().len(), 2);
        let pawn = play(&engine, &knight, "e7e5");
        assert_eq!(pawn.history().len(), 1);
    }

    #[test]
    fn test_repetitions_survive_reencoding() {
        let engine = ShakmatyEngine::new();
        let mut pos = engine.starting_position();
        for _ in 0..4 {
            for addr in ["g1f3", "g8f6", "f3g1"] {
                pos = play(&engine, &pos, addr);
            }
            let restored = engine
                .decode_with_history(&engine.encode(&pos), &engine.history(&pos))
                .unwrap();
            pos = play(&engine, &restored, "f6g8");
        }
        assert_eq!(pos.occurrences(), 5);
        assert!(engine.is_game_over(&pos));

        let fresh = engine.decode(&engine.encode(&pos)).unwrap();
        assert_eq!(fresh.occurrences(), 1);
    }

    #[test]
    fn test_mismatched_history_is_dropped() {
        let engine = ShakmatyEngine::new();
        let start = engine.starting_position();
        let after = play(&engine, &start, "g1f3");
        let restored = engine
            .decode_with_history(&engine.encode(&start), &engine.history(&after))
            .unwrap();
        assert_eq!(restored.history().len(), 1);
        assert_eq!(restored.occurrences(), 1);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let engine = ShakmatyEngine::new();
        assert!(matches!(
            engine.decode("not a fen"),
            Err(RulesError::InvalidFen { .. })
        ));
    }
}
