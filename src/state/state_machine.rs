use thiserror::Error;
use uuid::Uuid;

use crate::{dao::models::AdvanceEventEntity, state::round::RoundPhase};

/// Transitions the agent may request from the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundEvent {
    /// Host opens the first round of the table.
    StartRound,
    /// Suggestions close and voting opens.
    CloseSuggestions,
    /// Voting closes and the result is shown.
    CloseVoting,
    /// A finished round is followed by a new round in the suggest phase.
    NextRound,
    /// Host resolves a tie by picking the winner, then a new round starts.
    TieBreak {
        /// Suggestion picked by the host.
        winner_id: Uuid,
    },
}

impl RoundEvent {
    /// Name used in logs and event payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            RoundEvent::StartRound => "start_round",
            RoundEvent::CloseSuggestions => "close_suggestions",
            RoundEvent::CloseVoting => "close_voting",
            RoundEvent::NextRound => "next_round",
            RoundEvent::TieBreak { .. } => "tie_break",
        }
    }
}

impl From<RoundEvent> for AdvanceEventEntity {
    fn from(value: RoundEvent) -> Self {
        match value {
            RoundEvent::StartRound => AdvanceEventEntity::StartRound,
            RoundEvent::CloseSuggestions => AdvanceEventEntity::CloseSuggestions,
            RoundEvent::CloseVoting => AdvanceEventEntity::CloseVoting,
            RoundEvent::NextRound => AdvanceEventEntity::NextRound,
            RoundEvent::TieBreak { .. } => AdvanceEventEntity::TieBreak,
        }
    }
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The phase observed when the invalid event was received.
    pub from: Option<RoundPhase>,
    /// The event that cannot be applied from this phase.
    pub event: RoundEvent,
}

/// Errors that can occur when planning a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// An advance request is already in flight.
    AlreadyPending,
    /// The requested transition is not valid from the observed phase.
    InvalidTransition(InvalidTransition),
}

/// Errors that can occur when applying a planned transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyError {
    /// No transition is currently pending.
    NoPending,
    /// Plan ID does not match the pending plan.
    IdMismatch {
        /// Expected plan ID.
        expected: PlanId,
        /// Provided plan ID.
        got: PlanId,
    },
    /// A fresh snapshot moved the round while the request was in flight.
    VersionMismatch {
        /// Version when plan was created.
        expected: usize,
        /// Current version.
        actual: usize,
    },
}

/// Errors that can occur when aborting a planned transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortError {
    /// No transition is currently pending.
    NoPending,
    /// Plan ID does not match the pending plan.
    IdMismatch {
        /// Expected plan ID.
        expected: PlanId,
        /// Provided plan ID.
        got: PlanId,
    },
}

/// Unique identifier for a planned transition.
pub type PlanId = Uuid;

/// A validated transition whose advance request has not completed yet.
#[derive(Debug, Clone)]
pub struct Plan {
    pub id: PlanId,
    /// Round the request targets.
    pub round_id: Uuid,
    pub from: RoundPhase,
    pub to: RoundPhase,
    pub event: RoundEvent,
    pub version_next: usize,
}

/// Snapshot of the local phase tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub round_id: Option<Uuid>,
    pub phase: Option<RoundPhase>,
    pub version: usize,
    /// Event of the in-flight request, if any.
    pub pending: Option<RoundEvent>,
}

/// Local mirror of the round phase, guarding advance requests.
///
/// The store owns the authoritative phase; this machine follows it through
/// [`RoundStateMachine::observe`] and only allows one advance request in flight at a time.
#[derive(Debug, Clone, Default)]
pub struct RoundStateMachine {
    round_id: Option<Uuid>,
    phase: Option<RoundPhase>,
    version: usize,
    pending: Option<Plan>,
}

impl RoundStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> Option<RoundPhase> {
        self.phase
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            round_id: self.round_id,
            phase: self.phase,
            version: self.version,
            pending: self.pending.as_ref().map(|plan| plan.event),
        }
    }

    /// Follow the round reported by a fresh snapshot.
    pub fn observe(&mut self, round_id: Option<Uuid>, phase: Option<RoundPhase>) {
        if self.round_id == round_id && self.phase == phase {
            return;
        }
        self.round_id = round_id;
        self.phase = phase;
        self.version += 1;
    }

    /// Validate `event` against the observed phase and mark it in flight.
    pub fn plan(&mut self, event: RoundEvent) -> Result<Plan, PlanError> {
        if self.pending.is_some() {
            return Err(PlanError::AlreadyPending);
        }

        let (round_id, from, to) = self
            .compute_transition(event)
            .map_err(PlanError::InvalidTransition)?;

        let plan = Plan {
            id: Uuid::new_v4(),
            round_id,
            from,
            to,
            event,
            version_next: self.version + 1,
        };
        self.pending = Some(plan.clone());
        Ok(plan)
    }

    /// Record that the store performed the planned transition.
    pub fn apply(&mut self, plan_id: PlanId) -> Result<RoundPhase, ApplyError> {
        let plan = self.pending.take().ok_or(ApplyError::NoPending)?;

        if plan.id != plan_id {
            let expected = plan.id;
            self.pending = Some(plan);
            return Err(ApplyError::IdMismatch {
                expected,
                got: plan_id,
            });
        }

        if self.version + 1 != plan.version_next {
            return Err(ApplyError::VersionMismatch {
                expected: plan.version_next,
                actual: self.version + 1,
            });
        }

        self.phase = Some(plan.to);
        self.version = plan.version_next;
        Ok(plan.to)
    }

    /// Drop the in-flight plan without changing the observed phase.
    pub fn abort(&mut self, plan_id: PlanId) -> Result<(), AbortError> {
        let plan = self.pending.as_ref().ok_or(AbortError::NoPending)?;

        if plan.id != plan_id {
            return Err(AbortError::IdMismatch {
                expected: plan.id,
                got: plan_id,
            });
        }

        self.pending = None;
        Ok(())
    }

    fn compute_transition(
        &self,
        event: RoundEvent,
    ) -> Result<(Uuid, RoundPhase, RoundPhase), InvalidTransition> {
        let invalid = InvalidTransition {
            from: self.phase,
            event,
        };
        let (Some(round_id), Some(from)) = (self.round_id, self.phase) else {
            return Err(invalid);
        };

        let to = match (from, event) {
            (RoundPhase::Lobby, RoundEvent::StartRound) => RoundPhase::Suggest,
            (RoundPhase::Suggest, RoundEvent::CloseSuggestions) => RoundPhase::Vote,
            (RoundPhase::Vote, RoundEvent::CloseVoting) => RoundPhase::Result,
            (RoundPhase::Result, RoundEvent::NextRound) => RoundPhase::Suggest,
            (RoundPhase::Result, RoundEvent::TieBreak { .. }) => RoundPhase::Suggest,
            _ => return Err(invalid),
        };

        Ok((round_id, from, to))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observed(phase: RoundPhase) -> RoundStateMachine {
        let mut sm = RoundStateMachine::new();
        sm.observe(Some(Uuid::new_v4()), Some(phase));
        sm
    }

    fn apply(sm: &mut RoundStateMachine, event: RoundEvent) -> RoundPhase {
        let plan = sm.plan(event).unwrap();
        sm.apply(plan.id).unwrap()
    }

    #[test]
    fn initial_state_has_no_round() {
        let sm = RoundStateMachine::new();
        assert_eq!(sm.phase(), None);
        assert!(matches!(
            RoundStateMachine::new().plan(RoundEvent::StartRound),
            Err(PlanError::InvalidTransition(_))
        ));
    }

    #[test]
    fn full_round_cycle() {
        let mut sm = observed(RoundPhase::Lobby);

        assert_eq!(apply(&mut sm, RoundEvent::StartRound), RoundPhase::Suggest);
        assert_eq!(apply(&mut sm, RoundEvent::CloseSuggestions), RoundPhase::Vote);
        assert_eq!(apply(&mut sm, RoundEvent::CloseVoting), RoundPhase::Result);
        assert_eq!(apply(&mut sm, RoundEvent::NextRound), RoundPhase::Suggest);
    }

    #[test]
    fn tie_break_opens_the_next_round() {
        let mut sm = observed(RoundPhase::Result);
        let winner_id = Uuid::new_v4();

        assert_eq!(
            apply(&mut sm, RoundEvent::TieBreak { winner_id }),
            RoundPhase::Suggest
        );
    }

    #[test]
    fn second_plan_while_in_flight_is_rejected() {
        let mut sm = observed(RoundPhase::Result);

        let plan = sm.plan(RoundEvent::NextRound).unwrap();
        assert_eq!(sm.plan(RoundEvent::NextRound).unwrap_err(), PlanError::AlreadyPending);
        assert_eq!(sm.snapshot().pending, Some(RoundEvent::NextRound));

        sm.abort(plan.id).unwrap();
        assert!(sm.plan(RoundEvent::NextRound).is_ok());
    }

    #[test]
    fn invalid_transition_returns_error() {
        let mut sm = observed(RoundPhase::Suggest);
        let err = sm.plan(RoundEvent::CloseVoting).unwrap_err();
        match err {
            PlanError::InvalidTransition(invalid) => {
                assert_eq!(invalid.from, Some(RoundPhase::Suggest));
                assert_eq!(invalid.event, RoundEvent::CloseVoting);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn fresh_snapshot_during_flight_invalidates_the_plan() {
        let mut sm = observed(RoundPhase::Suggest);
        let plan = sm.plan(RoundEvent::CloseSuggestions).unwrap();

        sm.observe(Some(Uuid::new_v4()), Some(RoundPhase::Vote));

        assert!(matches!(
            sm.apply(plan.id),
            Err(ApplyError::VersionMismatch { .. })
        ));
        assert_eq!(sm.snapshot().pending, None);
        assert_eq!(sm.phase(), Some(RoundPhase::Vote));
    }

    #[test]
    fn observing_the_same_round_keeps_the_version() {
        let mut sm = RoundStateMachine::new();
        let round_id = Some(Uuid::new_v4());

        sm.observe(round_id, Some(RoundPhase::Vote));
        sm.observe(round_id, Some(RoundPhase::Vote));

        assert_eq!(sm.snapshot().version, 1);
    }

    #[test]
    fn abort_with_wrong_id_keeps_pending() {
        let mut sm = observed(RoundPhase::Lobby);
        sm.plan(RoundEvent::StartRound).unwrap();

        assert!(matches!(
            sm.abort(Uuid::new_v4()),
            Err(AbortError::IdMismatch { .. })
        ));
        assert!(sm.snapshot().pending.is_some());
    }
}
