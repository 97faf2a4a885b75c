//! Termination classification.

use crate::rules::RulesEngine;
use crate::types::{Color, GameStatus};
use tracing::instrument;

/// Classifies `position` after `mover` played into it.
///
/// First match wins: checkmate, stalemate, insufficient material, any other
/// automatic game end, otherwise the game goes on. The mover is the winner on
/// checkmate.
#[instrument(skip(engine, position))]
pub fn classify<E: RulesEngine>(engine: &E, position: &E::Position, mover: Color) -> GameStatus {
    if engine.is_checkmate(position) {
        GameStatus::Checkmate { winner: mover }
    } else if engine.is_stalemate(position) {
        GameStatus::Stalemate
    } else if engine.is_insufficient_material(position) {
        GameStatus::DrawInsufficientMaterial
    } else if engine.is_game_over(position) {
        GameStatus::DrawOther
    } else {
        GameStatus::InProgress
    }
}

/// Classifies a position with no move context, e.g. one just decoded.
///
/// The side that is not to move is treated as the last mover.
#[instrument(skip(engine, position))]
pub fn classify_position<E: RulesEngine>(engine: &E, position: &E::Position) -> GameStatus {
    let mover = engine.side_to_move(position).opponent();
    classify(engine, position, mover)
}
