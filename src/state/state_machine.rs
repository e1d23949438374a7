use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    clock::Timestamp,
    services::game_flow::GameFlow,
    state::scoreboard::ScoreboardState,
};

/// Where the game is in its period lifecycle, derived from a snapshot.
///
/// `advance_quarter` moves `InProgress(q)` to `Rest { upcoming: q + 1 }`; the
/// rest ending (skipped or expired) lands in `InProgress(q + 1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PeriodPhase {
    /// A period is being played (clocks may be running or stopped).
    InProgress {
        /// Period number; above the regulation total means overtime.
        quarter: u32,
    },
    /// Break before the given period.
    Rest {
        /// Period that starts when the rest ends.
        upcoming: u32,
    },
}

impl PeriodPhase {
    pub fn of(state: &ScoreboardState) -> Self {
        if state.rest_active {
            PeriodPhase::Rest {
                upcoming: state.quarter,
            }
        } else {
            PeriodPhase::InProgress {
                quarter: state.quarter,
            }
        }
    }

    pub fn quarter(&self) -> u32 {
        match *self {
            PeriodPhase::InProgress { quarter } => quarter,
            PeriodPhase::Rest { upcoming } => upcoming,
        }
    }
}

/// Summary the control surface uses to enable or disable its period buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStatus {
    pub phase: PeriodPhase,
    pub overtime: bool,
    /// Another regulation quarter exists.
    pub can_advance: bool,
    /// Regulation is over and the score is tied.
    pub can_start_overtime: bool,
    /// "Next period" should be offered at all: false once an overtime period
    /// has a leader.
    pub next_period_available: bool,
    /// Final period is over (clock expired, no rest) with a winner.
    pub complete: bool,
}

impl GameStatus {
    pub fn of(state: &ScoreboardState, now: Timestamp) -> Self {
        let overtime = state.quarter > state.total_quarters;
        let last_period = state.quarter >= state.total_quarters;
        let tied = state.scores_tied();

        Self {
            phase: PeriodPhase::of(state),
            overtime,
            can_advance: state.quarter < state.total_quarters,
            can_start_overtime: last_period && tied,
            next_period_available: !(overtime && !tied),
            complete: last_period
                && !tied
                && !state.rest_active
                && state.current_game_time(now) == 0,
        }
    }
}

/// Identifier of a quarter advance awaiting confirmation.
pub type PlanId = Uuid;

/// A quarter advance the operator asked for but has not confirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAdvance {
    pub id: PlanId,
    /// Quarter shown when the request was made.
    pub from_quarter: u32,
    /// Quarter that confirming will start.
    pub to_quarter: u32,
    pub requested_at: Timestamp,
}

/// Errors raised when asking to advance the quarter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    /// An advance is already waiting to be confirmed or cancelled.
    #[error("a quarter advance is already awaiting confirmation")]
    AlreadyPending,
    /// Regulation has no quarter after the current one.
    #[error("quarter {quarter} is the last of {total_quarters}; no further quarter to advance to")]
    NoFurtherQuarter { quarter: u32, total_quarters: u32 },
}

/// Errors raised when confirming or cancelling a pending advance.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfirmError {
    /// Nothing is awaiting confirmation.
    #[error("no quarter advance is pending")]
    NoPending,
    /// The id does not belong to the pending advance.
    #[error("pending advance {expected} does not match {got}")]
    IdMismatch { expected: PlanId, got: PlanId },
    /// The quarter changed underneath the request, e.g. in another context.
    #[error("quarter changed while awaiting confirmation (expected {expected}, now {actual})")]
    QuarterMismatch { expected: u32, actual: u32 },
    /// The advance was refused, e.g. another context lowered the quarter count.
    #[error("quarter advance did not take effect (expected {expected}, now {actual})")]
    NotApplied { expected: u32, actual: u32 },
}

/// Confirmation step in front of [`GameFlow::advance_quarter`].
///
/// Lives only in the control surface that shows the dialog; it is never
/// persisted or broadcast.
#[derive(Debug, Default)]
pub struct QuarterFlow {
    pending: Option<PendingAdvance>,
}

impl QuarterFlow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> Option<&PendingAdvance> {
        self.pending.as_ref()
    }

    /// Validate an advance against `state` and hold it until confirmed.
    pub fn request_advance(
        &mut self,
        state: &ScoreboardState,
        now: Timestamp,
    ) -> Result<PendingAdvance, PlanError> {
        if self.pending.is_some() {
            return Err(PlanError::AlreadyPending);
        }
        if state.quarter >= state.total_quarters {
            return Err(PlanError::NoFurtherQuarter {
                quarter: state.quarter,
                total_quarters: state.total_quarters,
            });
        }

        let pending = PendingAdvance {
            id: Uuid::new_v4(),
            from_quarter: state.quarter,
            to_quarter: state.quarter + 1,
            requested_at: now,
        };
        self.pending = Some(pending.clone());
        Ok(pending)
    }

    /// Run the pending advance, returning the quarter that is now resting
    /// before play.
    pub fn confirm(&mut self, id: PlanId, flow: &GameFlow) -> Result<u32, ConfirmError> {
        let pending = self.pending.take().ok_or(ConfirmError::NoPending)?;

        if pending.id != id {
            let expected = pending.id;
            self.pending = Some(pending);
            return Err(ConfirmError::IdMismatch { expected, got: id });
        }

        let actual = flow.store().get_state().quarter;
        if actual != pending.from_quarter {
            return Err(ConfirmError::QuarterMismatch {
                expected: pending.from_quarter,
                actual,
            });
        }

        flow.advance_quarter();
        let actual = flow.store().get_state().quarter;
        if actual != pending.to_quarter {
            return Err(ConfirmError::NotApplied {
                expected: pending.to_quarter,
                actual,
            });
        }
        Ok(pending.to_quarter)
    }

    /// Drop the pending advance without touching the scoreboard.
    pub fn cancel(&mut self, id: PlanId) -> Result<(), ConfirmError> {
        let pending = self.pending.as_ref().ok_or(ConfirmError::NoPending)?;

        if pending.id != id {
            return Err(ConfirmError::IdMismatch {
                expected: pending.id,
                got: id,
            });
        }

        self.pending = None;
        Ok(())
    }
}
