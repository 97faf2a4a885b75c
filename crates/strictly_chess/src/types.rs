//! Core domain types for chess sessions.

use serde::{Deserialize, Serialize};
use tracing::instrument;

/// Side in the game.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum Color {
    /// White (moves first).
    White,
    /// Black.
    Black,
}

impl Color {
    /// Returns the opposing side.
    pub fn opponent(self) -> Self {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }

    /// True for [`Color::White`].
    pub fn is_white(self) -> bool {
        self == Color::White
    }

    /// Maps the stored `white_to_move` flag back to a side.
    pub fn from_white_flag(white: bool) -> Self {
        if white { Color::White } else { Color::Black }
    }
}

/// Current status of the game.
///
/// `InProgress` is the only non-terminal state. Terminal states are only
/// left through a reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum GameStatus {
    /// Game is ongoing.
    InProgress,
    /// The winner delivered mate.
    Checkmate {
        /// Side that made the mating move.
        winner: Color,
    },
    /// Side to move has no legal move and is not in check.
    Stalemate,
    /// Neither side can possibly mate.
    DrawInsufficientMaterial,
    /// Any other automatic game end (seventy-five-move rule, fivefold repetition).
    DrawOther,
}

impl GameStatus {
    /// Returns true for every state except [`GameStatus::InProgress`].
    pub fn is_terminal(&self) -> bool {
        !matches!(self, GameStatus::InProgress)
    }

    /// Returns the winner if the game ended in checkmate.
    pub fn winner(&self) -> Option<Color> {
        match self {
            GameStatus::Checkmate { winner } => Some(*winner),
            _ => None,
        }
    }

    /// Human-readable end-of-game line. Empty while the game is running.
    pub fn announcement(&self) -> String {
        match self {
            GameStatus::InProgress => String::new(),
            GameStatus::Checkmate { winner } => format!("Checkmate! {} wins!", winner),
            GameStatus::Stalemate => "Stalemate! The game is a draw.".to_string(),
            GameStatus::DrawInsufficientMaterial => {
                "Draw due to insufficient material.".to_string()
            }
            GameStatus::DrawOther => "Game over: Draw.".to_string(),
        }
    }

    /// Converts status to the string stored in a database column.
    #[instrument]
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Checkmate {
                winner: Color::White,
            } => "checkmate_white",
            Self::Checkmate {
                winner: Color::Black,
            } => "checkmate_black",
            Self::Stalemate => "stalemate",
            Self::DrawInsufficientMaterial => "draw_insufficient_material",
            Self::DrawOther => "draw_other",
        }
    }

    /// Parses status from its stored string. Returns `None` for unknown values.
    #[instrument(skip(s), fields(s = %s))]
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "in_progress" => Some(Self::InProgress),
            "checkmate_white" => Some(Self::Checkmate {
                winner: Color::White,
            }),
            "checkmate_black" => Some(Self::Checkmate {
                winner: Color::Black,
            }),
            "stalemate" => Some(Self::Stalemate),
            "draw_insufficient_material" => Some(Self::DrawInsufficientMaterial),
            "draw_other" => Some(Self::DrawOther),
            _ => None,
        }
    }
}

/// Why a submitted move was turned down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// The token is not a board-address pair the engine understands.
    InvalidFormat,
    /// Well formed, but not legal in the current position.
    Illegal,
}

impl RejectReason {
    /// Status message shown to the player after this rejection.
    pub fn message(self) -> &'static str {
        match self {
            RejectReason::InvalidFormat => INVALID_FORMAT_MESSAGE,
            RejectReason::Illegal => ILLEGAL_MOVE_MESSAGE,
        }
    }
}

/// Message set when the token cannot be parsed.
pub const INVALID_FORMAT_MESSAGE: &str = "Invalid move format! Try again.";

/// Message set when the move is not legal.
pub const ILLEGAL_MOVE_MESSAGE: &str = "Illegal move! Try again.";

/// Result of [`crate::GameSession::apply_move`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum MoveOutcome {
    /// The move was played; carries the status after classification.
    Applied(GameStatus),
    /// The move was refused; position untouched.
    Rejected(RejectReason),
    /// Nothing happened (finished game, empty or repeated token).
    Unchanged,
}

impl MoveOutcome {
    /// True if the position changed.
    pub fn is_applied(&self) -> bool {
        matches!(self, MoveOutcome::Applied(_))
    }
}

/// Read-only projection of a session for presentation and transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// FEN of the current position.
    pub position_encoding: String,
    /// Side to move.
    pub turn: Color,
    /// Game status.
    pub status: GameStatus,
    /// Last validation message, or the end-of-game announcement.
    pub status_message: String,
}

/// Everything needed to rebuild a session: the snapshot, the idempotence
/// guard and the position history the FEN does not carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    /// Presentation fields.
    #[serde(flatten)]
    pub snapshot: SessionSnapshot,
    /// Raw token last consumed by `apply_move`.
    pub last_processed_input: Option<String>,
    /// Repetition keys since the last irreversible move, current last.
    #[serde(default)]
    pub position_history: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_opponent() {
        assert_eq!(Color::White.opponent(), Color::Black);
        assert_eq!(Color::Black.opponent(), Color::White);
        assert_eq!(Color::from_white_flag(false), Color::Black);
    }

    #[test]
    fn test_status_db_strings() {
        let all = [
            GameStatus::InProgress,
            GameStatus::Checkmate {
                winner: Color::White,
            },
            GameStatus::Checkmate {
                winner: Color::Black,
            },
            GameStatus::Stalemate,
            GameStatus::DrawInsufficientMaterial,
            GameStatus::DrawOther,
        ];
        for status in all {
            assert_eq!(GameStatus::from_db_string(status.to_db_string()), Some(status));
        }
        assert_eq!(GameStatus::from_db_string("resigned"), None);
    }

    #[test]
    fn test_announcements() {
        assert_eq!(GameStatus::InProgress.announcement(), "");
        assert_eq!(
            GameStatus::Checkmate {
                winner: Color::Black
            }
            .announcement(),
            "Checkmate! Black wins!"
        );
        assert_eq!(GameStatus::DrawOther.announcement(), "Game over: Draw.");
    }

    #[test]
    fn test_outcome_json_shape() {
        let json = serde_json::to_value(MoveOutcome::Applied(GameStatus::Checkmate {
            winner: Color::White,
        }))
        .unwrap();
        assert_eq!(json["outcome"], "applied");
        assert_eq!(json["detail"]["state"], "checkmate");
        assert_eq!(json["detail"]["winner"], "white");

        let json = serde_json::to_value(MoveOutcome::Rejected(RejectReason::Illegal)).unwrap();
        assert_eq!(json["detail"], "illegal");
    }
}
