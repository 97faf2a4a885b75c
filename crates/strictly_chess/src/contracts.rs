//! Contract-based validation for session moves.
//!
//! Preconditions decide whether a submitted token is looked at at all;
//! postconditions re-check the session invariants after a transition.

use crate::invariants::{InvariantSet, InvariantViolation, SessionInvariants};
use crate::rules::RulesEngine;
use crate::session::GameSession;
use tracing::{instrument, warn};

/// Why a token was ignored without being validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum Ignored {
    /// The game already ended.
    #[display("session already terminated")]
    SessionTerminated,
    /// Nothing was submitted.
    #[display("empty input")]
    EmptyInput,
    /// Same token as the last one processed.
    #[display("input already processed")]
    DuplicateInput,
}

/// Precondition: the game is still running.
pub struct SessionOpen;

impl SessionOpen {
    /// Fails with [`Ignored::SessionTerminated`] once the status is terminal.
    pub fn check<E: RulesEngine>(session: &GameSession<E>) -> Result<(), Ignored> {
        if session.status().is_terminal() {
            Err(Ignored::SessionTerminated)
        } else {
            Ok(())
        }
    }
}

/// Precondition: something was submitted.
pub struct NonEmptyInput;

impl NonEmptyInput {
    /// Fails with [`Ignored::EmptyInput`] for an empty token.
    pub fn check(raw: &str) -> Result<(), Ignored> {
        if raw.is_empty() {
            Err(Ignored::EmptyInput)
        } else {
            Ok(())
        }
    }
}

/// Precondition: the token differs from the last one processed.
pub struct FreshInput;

impl FreshInput {
    /// Fails with [`Ignored::DuplicateInput`] on a repeated token.
    pub fn check<E: RulesEngine>(session: &GameSession<E>, raw: &str) -> Result<(), Ignored> {
        if session.last_processed_input() == Some(raw) {
            Err(Ignored::DuplicateInput)
        } else {
            Ok(())
        }
    }
}

/// Contract for `apply_move`.
///
/// Preconditions: session open, input non-empty, input fresh.
/// Postconditions: [`SessionInvariants`].
pub struct MoveContract;

impl MoveContract {
    /// Checks every precondition in order.
    #[instrument(skip(session))]
    pub fn pre<E: RulesEngine>(session: &GameSession<E>, raw: &str) -> Result<(), Ignored> {
        SessionOpen::check(session)?;
        NonEmptyInput::check(raw)?;
        FreshInput::check(session, raw)?;
        Ok(())
    }

    /// Checks the invariant set on the post-transition session.
    #[instrument(skip(after))]
    pub fn post<E: RulesEngine>(after: &GameSession<E>) -> Result<(), Vec<InvariantViolation>> {
        SessionInvariants::check_all(after).inspect_err(|violations| {
            let descriptions = violations
                .iter()
                .map(|v| v.description.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            warn!(violations = %descriptions, "Postcondition failed");
        })
    }
}
