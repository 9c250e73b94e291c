use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Phase of a round as persisted by the store.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PhaseEntity {
    Lobby,
    Suggest,
    Vote,
    Result,
}

/// Shared session ("table") participants join.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableEntity {
    /// Primary key of the table.
    pub id: Uuid,
    /// Display name of the table.
    pub name: String,
    /// Participant allowed to drive manual actions and tie-breaks.
    pub host_id: Uuid,
    /// Whether rounds with a single winner advance on their own.
    #[serde(default)]
    pub auto_advance: Option<bool>,
}

/// One suggest → vote → result cycle within a table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoundEntity {
    /// Primary key of the round.
    pub id: Uuid,
    /// Owning table.
    pub table_id: Uuid,
    /// Sequence number of the round within its table (starts at 1).
    pub sequence: u32,
    /// Current phase.
    pub phase: PhaseEntity,
    /// Absolute deadline of the current phase, if any.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub deadline: Option<OffsetDateTime>,
    /// Winner recorded by a host tie-break.
    #[serde(default)]
    pub winner_id: Option<Uuid>,
}

/// Suggestion submitted during the suggest phase.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SuggestionEntity {
    pub id: Uuid,
    pub round_id: Uuid,
    pub author_id: Uuid,
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Vote cast during the vote phase; unique per (round, voter).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VoteEntity {
    pub id: Uuid,
    pub round_id: Uuid,
    pub voter_id: Uuid,
    pub suggestion_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Participant registered at a table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParticipantEntity {
    pub id: Uuid,
    pub table_id: Uuid,
    pub display_name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub joined_at: OffsetDateTime,
}

/// Everything a client needs to render a table, fetched in one read.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableSnapshotEntity {
    pub table: TableEntity,
    /// Latest round of the table, if one exists.
    pub round: Option<RoundEntity>,
    /// Suggestions of the latest round.
    pub suggestions: Vec<SuggestionEntity>,
    /// Votes of the latest round.
    pub votes: Vec<VoteEntity>,
    pub participants: Vec<ParticipantEntity>,
}

/// Suggestion insert payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewSuggestionEntity {
    pub round_id: Uuid,
    pub author_id: Uuid,
    pub text: String,
}

/// Vote insert payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewVoteEntity {
    pub round_id: Uuid,
    pub voter_id: Uuid,
    pub suggestion_id: Uuid,
}

/// Result of a vote insert; a uniqueness violation is not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteInsertEntity {
    /// The vote was stored.
    Inserted(VoteEntity),
    /// The voter already has a vote for this round.
    Duplicate,
}

/// Transition requested from the atomic advance operation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AdvanceEventEntity {
    StartRound,
    CloseSuggestions,
    CloseVoting,
    NextRound,
    TieBreak,
}

/// Arguments of the atomic advance operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AdvanceRequestEntity {
    pub table_id: Uuid,
    /// Round the requester observed; the operation is a no-op when it is no longer current.
    pub round_id: Uuid,
    /// Phase the requester observed for `round_id`.
    pub from_phase: PhaseEntity,
    pub requester_id: Uuid,
    pub event: AdvanceEventEntity,
    /// Deadline of the phase being entered.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub deadline: Option<OffsetDateTime>,
    /// Winner picked by the host on tie-break.
    #[serde(default)]
    pub winner_id: Option<Uuid>,
}

/// Result of the atomic advance operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AdvanceOutcomeEntity {
    /// This request performed the transition; `round` is the round now current.
    Advanced { round: RoundEntity },
    /// Another request already moved the table (or the request was stale).
    Noop {
        #[serde(default)]
        round: Option<RoundEntity>,
    },
}

/// Summary returned by the cleanup operations.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CleanupSummaryEntity {
    #[serde(default)]
    pub affected_rounds: Vec<Uuid>,
    #[serde(default)]
    pub affected_tables: Vec<Uuid>,
}

/// Reply of the lightweight reachability probe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProbeEntity {
    /// Server wall-clock time when the probe was answered.
    #[serde(with = "time::serde::rfc3339")]
    pub server_time: OffsetDateTime,
}
