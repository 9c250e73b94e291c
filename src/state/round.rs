use std::fmt;

use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    dao::models::{
        ParticipantEntity, PhaseEntity, RoundEntity, SuggestionEntity, TableEntity,
        TableSnapshotEntity, VoteEntity,
    },
    state::tally::{self, WinnerResolution},
};

/// Phase of a round as seen by this agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoundPhase {
    /// Waiting for the host to start the first round.
    Lobby,
    /// Participants submit suggestions until the deadline.
    Suggest,
    /// Participants vote on the suggestions until the deadline.
    Vote,
    /// Votes are closed and the tally is final.
    Result,
}

impl RoundPhase {
    /// Phases driven by a deadline.
    pub fn is_timed(self) -> bool {
        matches!(self, RoundPhase::Suggest | RoundPhase::Vote)
    }
}

impl fmt::Display for RoundPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RoundPhase::Lobby => "lobby",
            RoundPhase::Suggest => "suggest",
            RoundPhase::Vote => "vote",
            RoundPhase::Result => "result",
        };
        f.write_str(label)
    }
}

impl From<PhaseEntity> for RoundPhase {
    fn from(value: PhaseEntity) -> Self {
        match value {
            PhaseEntity::Lobby => RoundPhase::Lobby,
            PhaseEntity::Suggest => RoundPhase::Suggest,
            PhaseEntity::Vote => RoundPhase::Vote,
            PhaseEntity::Result => RoundPhase::Result,
        }
    }
}

impl From<RoundPhase> for PhaseEntity {
    fn from(value: RoundPhase) -> Self {
        match value {
            RoundPhase::Lobby => PhaseEntity::Lobby,
            RoundPhase::Suggest => PhaseEntity::Suggest,
            RoundPhase::Vote => PhaseEntity::Vote,
            RoundPhase::Result => PhaseEntity::Result,
        }
    }
}

/// Shared session the agent participates in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub id: Uuid,
    pub name: String,
    pub host_id: Uuid,
    /// Per-table auto-advance flag; `None` defers to the configured default.
    pub auto_advance: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Round {
    pub id: Uuid,
    pub table_id: Uuid,
    pub sequence: u32,
    pub phase: RoundPhase,
    pub deadline: Option<OffsetDateTime>,
    pub winner_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion {
    pub id: Uuid,
    pub author_id: Uuid,
    pub text: String,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vote {
    pub id: Uuid,
    pub voter_id: Uuid,
    pub suggestion_id: Uuid,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub id: Uuid,
    pub display_name: String,
    pub joined_at: OffsetDateTime,
}

/// Read-only cache of the table as last fetched from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableView {
    pub table: Table,
    pub round: Option<Round>,
    pub suggestions: Vec<Suggestion>,
    pub votes: Vec<Vote>,
    pub participants: Vec<Participant>,
    /// Local wall-clock time at which the view was fetched.
    pub fetched_at: OffsetDateTime,
}

impl TableView {
    /// Build a view from a store snapshot.
    pub fn from_entity(entity: TableSnapshotEntity, fetched_at: OffsetDateTime) -> Self {
        Self {
            table: entity.table.into(),
            round: entity.round.map(Into::into),
            suggestions: entity.suggestions.into_iter().map(Into::into).collect(),
            votes: entity.votes.into_iter().map(Into::into).collect(),
            participants: entity.participants.into_iter().map(Into::into).collect(),
            fetched_at,
        }
    }

    /// Phase of the current round, if any.
    pub fn phase(&self) -> Option<RoundPhase> {
        self.round.as_ref().map(|round| round.phase)
    }

    /// Whether `participant_id` hosts the table.
    pub fn is_host(&self, participant_id: Uuid) -> bool {
        self.table.host_id == participant_id
    }

    /// Whether `suggestion_id` belongs to the current round.
    pub fn has_suggestion(&self, suggestion_id: Uuid) -> bool {
        self.suggestions
            .iter()
            .any(|suggestion| suggestion.id == suggestion_id)
    }
}

/// Table view paired with the tally derived from it.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundSnapshot {
    pub view: TableView,
    pub tally: WinnerResolution,
}

impl RoundSnapshot {
    /// Derive the tally for `view`.
    pub fn new(view: TableView) -> Self {
        let tally = tally::resolve(&view.suggestions, &view.votes);
        Self { view, tally }
    }

    pub fn round(&self) -> Option<&Round> {
        self.view.round.as_ref()
    }

    pub fn phase(&self) -> Option<RoundPhase> {
        self.view.phase()
    }
}

impl From<TableEntity> for Table {
    fn from(value: TableEntity) -> Self {
        Self {
            id: value.id,
            name: value.name,
            host_id: value.host_id,
            auto_advance: value.auto_advance,
        }
    }
}

impl From<RoundEntity> for Round {
    fn from(value: RoundEntity) -> Self {
        Self {
            id: value.id,
            table_id: value.table_id,
            sequence: value.sequence,
            phase: value.phase.into(),
            deadline: value.deadline,
            winner_id: value.winner_id,
        }
    }
}

impl From<SuggestionEntity> for Suggestion {
    fn from(value: SuggestionEntity) -> Self {
        Self {
            id: value.id,
            author_id: value.author_id,
            text: value.text,
            created_at: value.created_at,
        }
    }
}

impl From<VoteEntity> for Vote {
    fn from(value: VoteEntity) -> Self {
        Self {
            id: value.id,
            voter_id: value.voter_id,
            suggestion_id: value.suggestion_id,
            created_at: value.created_at,
        }
    }
}

impl From<ParticipantEntity> for Participant {
    fn from(value: ParticipantEntity) -> Self {
        Self {
            id: value.id,
            display_name: value.display_name,
            joined_at: value.joined_at,
        }
    }
}
