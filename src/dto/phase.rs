use serde::Serialize;
use utoipa::ToSchema;

use crate::state::round::RoundPhase;

/// Round phase exposed to the UI (REST/SSE).
#[derive(Debug, Serialize, ToSchema, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VisiblePhase {
    /// Waiting for the host to start.
    Lobby,
    /// Suggestions are open.
    Suggest,
    /// Voting is open.
    Vote,
    /// Tally is final.
    Result,
}

impl From<RoundPhase> for VisiblePhase {
    fn from(value: RoundPhase) -> Self {
        match value {
            RoundPhase::Lobby => VisiblePhase::Lobby,
            RoundPhase::Suggest => VisiblePhase::Suggest,
            RoundPhase::Vote => VisiblePhase::Vote,
            RoundPhase::Result => VisiblePhase::Result,
        }
    }
}
