//! Move-token normalization.
//!
//! Presentation layers hand us raw tokens in one of two shapes: the plain
//! UCI address (`e2e4`, `e7e8q`) or the hyphenated form emitted by
//! drag-and-drop boards (`e2-e4`). Both collapse to the same engine address.

use tracing::instrument;

/// Separator emitted by drag-and-drop widgets between origin and destination.
pub const SQUARE_SEPARATOR: char = '-';

/// Strips every separator so the token becomes a UCI-style address.
///
/// No other rewriting happens: case and surrounding whitespace are left for
/// the engine to accept or refuse.
#[instrument]
pub fn normalize(raw: &str) -> String {
    raw.chars().filter(|c| *c != SQUARE_SEPARATOR).collect()
}
