//! Text rendering of a game for the terminal.

use crate::store::GameView;
use strictly_chess::{GameStatus, SessionSnapshot};

fn glyph(piece: char) -> Option<char> {
    Some(match piece {
        'K' => '♔',
        'Q' => '♕',
        'R' => '♖',
        'B' => '♗',
        'N' => '♘',
        'P' => '♙',
        'k' => '♚',
        'q' => '♛',
        'r' => '♜',
        'b' => '♝',
        'n' => '♞',
        'p' => '♟',
        _ => return None,
    })
}

/// Draws the piece-placement field of `fen` as eight labelled ranks.
///
/// Unknown characters are drawn as `?` rather than rejected; the position
/// itself was validated when it was stored.
pub fn render_board(fen: &str) -> String {
    let placement = fen.split_whitespace().next().unwrap_or_default();
    let mut out = String::new();

    for (index, rank) in placement.split('/').enumerate() {
        out.push_str(&(8usize.saturating_sub(index)).to_string());
        for c in rank.chars() {
            match c.to_digit(10) {
                Some(empty) => (0..empty).for_each(|_| out.push_str(" ·")),
                None => {
                    out.push(' ');
                    out.push(glyph(c).unwrap_or('?'));
                }
            }
        }
        out.push('\n');
    }
    out.push_str("  a b c d e f g h\n");
    out
}

/// Board of a stored game, with its version.
pub fn render_view(view: &GameView) -> String {
    format!(
        "[{} v{}]\n{}",
        view.game_id,
        view.version,
        render_snapshot(&view.snapshot)
    )
}

/// Board plus turn, status and message lines.
pub fn render_snapshot(snapshot: &SessionSnapshot) -> String {
    let mut out = render_board(&snapshot.position_encoding);
    match snapshot.status {
        GameStatus::InProgress => out.push_str(&format!("{} to move\n", snapshot.turn)),
        status => out.push_str(&format!("{}\n", status.announcement())),
    }
    if !snapshot.status_message.is_empty() && !snapshot.status.is_terminal() {
        out.push_str(&format!("{}\n", snapshot.status_message));
    }
    out
}
