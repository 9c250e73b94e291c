//! Rules deciding when this agent may ask the store to advance a round.

use std::time::Duration;

use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::state::{
    round::{RoundPhase, RoundSnapshot},
    state_machine::RoundEvent,
};

/// Round that should advance on its own, and the winner that made it eligible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoAdvanceTarget {
    pub round_id: Uuid,
    pub winner_id: Uuid,
}

/// Reasons a host action is refused locally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdvanceRejection {
    #[error("the table has no round yet")]
    NoRound,
    #[error("only the table host may do this")]
    NotHost,
    #[error("{event} is not allowed while the round is in {phase}")]
    WrongPhase {
        event: &'static str,
        phase: RoundPhase,
    },
    #[error("the round did not end in a tie")]
    NotATie,
    #[error("suggestion `{0}` is not one of the tied winners")]
    NotAWinner(Uuid),
}

/// Auto-advance applies to a finished round with exactly one winner, when enabled for the table.
pub fn auto_advance_target(snapshot: &RoundSnapshot, default_enabled: bool) -> Option<AutoAdvanceTarget> {
    let enabled = snapshot.view.table.auto_advance.unwrap_or(default_enabled);
    if !enabled {
        return None;
    }
    let round = snapshot.round()?;
    if round.phase != RoundPhase::Result {
        return None;
    }
    let winner_id = snapshot.tally.single_winner()?;
    Some(AutoAdvanceTarget {
        round_id: round.id,
        winner_id,
    })
}

/// Event that closes a timed phase once its countdown reaches zero.
pub fn expiry_event(phase: RoundPhase) -> Option<RoundEvent> {
    match phase {
        RoundPhase::Suggest => Some(RoundEvent::CloseSuggestions),
        RoundPhase::Vote => Some(RoundEvent::CloseVoting),
        RoundPhase::Lobby | RoundPhase::Result => None,
    }
}

/// Deadline of the phase entered by `event`.
pub fn next_deadline(
    event: RoundEvent,
    now: OffsetDateTime,
    suggest_duration: Duration,
    vote_duration: Duration,
) -> Option<OffsetDateTime> {
    match event {
        RoundEvent::StartRound | RoundEvent::NextRound | RoundEvent::TieBreak { .. } => {
            Some(now + suggest_duration)
        }
        RoundEvent::CloseSuggestions => Some(now + vote_duration),
        RoundEvent::CloseVoting => None,
    }
}

/// Check a manual advance requested through the host controls.
pub fn check_host_advance(
    snapshot: &RoundSnapshot,
    requester_id: Uuid,
    event: RoundEvent,
) -> Result<(), AdvanceRejection> {
    let round = snapshot.round().ok_or(AdvanceRejection::NoRound)?;
    if !snapshot.view.is_host(requester_id) {
        return Err(AdvanceRejection::NotHost);
    }
    let allowed = matches!(
        (round.phase, event),
        (RoundPhase::Lobby, RoundEvent::StartRound)
            | (RoundPhase::Suggest, RoundEvent::CloseSuggestions)
            | (RoundPhase::Vote, RoundEvent::CloseVoting)
            | (RoundPhase::Result, RoundEvent::NextRound)
    );
    if !allowed {
        return Err(AdvanceRejection::WrongPhase {
            event: event.as_str(),
            phase: round.phase,
        });
    }
    Ok(())
}

/// Check a tie-break pick: host only, in `result`, while tied, picking a tied winner.
pub fn check_tie_break(
    snapshot: &RoundSnapshot,
    requester_id: Uuid,
    winner_id: Uuid,
) -> Result<(), AdvanceRejection> {
    let round = snapshot.round().ok_or(AdvanceRejection::NoRound)?;
    if !snapshot.view.is_host(requester_id) {
        return Err(AdvanceRejection::NotHost);
    }
    if round.phase != RoundPhase::Result {
        return Err(AdvanceRejection::WrongPhase {
            event: "tie_break",
            phase: round.phase,
        });
    }
    if !snapshot.tally.is_tie {
        return Err(AdvanceRejection::NotATie);
    }
    if !snapshot.tally.winners.contains(&winner_id) {
        return Err(AdvanceRejection::NotAWinner(winner_id));
    }
    Ok(())
}
