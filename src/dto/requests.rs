//! Request payloads accepted by the local HTTP surface.

use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::{dto::validation::validate_suggestion_text, state::state_machine::RoundEvent};

/// Suggestion submitted during the suggest phase.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SubmitSuggestionRequest {
    /// 1 to 140 characters once trimmed.
    pub text: String,
}

impl Validate for SubmitSuggestionRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Err(err) = validate_suggestion_text(&self.text) {
            errors.add("text", err);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Vote cast during the vote phase.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CastVoteRequest {
    pub suggestion_id: Uuid,
}

/// Transitions the host may request manually.
#[derive(Debug, Clone, Copy, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AdvanceAction {
    StartRound,
    CloseSuggestions,
    CloseVoting,
    NextRound,
}

impl From<AdvanceAction> for RoundEvent {
    fn from(value: AdvanceAction) -> Self {
        match value {
            AdvanceAction::StartRound => RoundEvent::StartRound,
            AdvanceAction::CloseSuggestions => RoundEvent::CloseSuggestions,
            AdvanceAction::CloseVoting => RoundEvent::CloseVoting,
            AdvanceAction::NextRound => RoundEvent::NextRound,
        }
    }
}

/// Manual advance requested by the host.
#[derive(Debug, Deserialize, ToSchema)]
pub struct AdvanceRoundRequest {
    pub action: AdvanceAction,
}

/// Host pick resolving a tied round.
#[derive(Debug, Deserialize, ToSchema)]
pub struct TieBreakRequest {
    pub winner_id: Uuid,
}

/// OS-level connectivity change forwarded by the UI shell.
#[derive(Debug, Deserialize, ToSchema)]
pub struct NetworkStatusRequest {
    pub online: bool,
}
