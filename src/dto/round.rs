//! Derived round state exposed to the UI.

use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dao::models::{CleanupSummaryEntity, SuggestionEntity},
    dto::{format_timestamp, phase::VisiblePhase},
    state::{
        clock_sync::CountdownReading,
        connection::ConnectionSample,
        round::{Participant, Round, RoundSnapshot, Table},
        tally::WinnerResolution,
        watchdog::WatchdogState,
    },
};

#[derive(Debug, Serialize, ToSchema, Clone)]
pub struct TableSummary {
    pub id: Uuid,
    pub name: String,
    pub host_id: Uuid,
    /// Effective auto-advance setting (table flag or configured default).
    pub auto_advance: bool,
}

impl TableSummary {
    pub fn new(table: &Table, default_auto_advance: bool) -> Self {
        Self {
            id: table.id,
            name: table.name.clone(),
            host_id: table.host_id,
            auto_advance: table.auto_advance.unwrap_or(default_auto_advance),
        }
    }
}

#[derive(Debug, Serialize, ToSchema, Clone)]
pub struct RoundSummary {
    pub id: Uuid,
    pub sequence: u32,
    pub phase: VisiblePhase,
    /// RFC 3339 deadline of the current phase.
    pub deadline: Option<String>,
    /// Winner recorded by a host tie-break.
    pub winner_id: Option<Uuid>,
}

impl From<&Round> for RoundSummary {
    fn from(round: &Round) -> Self {
        Self {
            id: round.id,
            sequence: round.sequence,
            phase: round.phase.into(),
            deadline: round.deadline.map(format_timestamp),
            winner_id: round.winner_id,
        }
    }
}

/// Suggestion with its share of the votes.
#[derive(Debug, Serialize, ToSchema, Clone)]
pub struct SuggestionSummary {
    pub id: Uuid,
    pub author_id: Uuid,
    pub text: String,
    pub created_at: String,
    pub votes: u32,
    pub percentage: u32,
    pub is_winner: bool,
}

#[derive(Debug, Serialize, ToSchema, Clone)]
pub struct TallySummary {
    pub max_votes: u32,
    pub winners: Vec<Uuid>,
    pub is_tie: bool,
    pub has_votes: bool,
    pub total_votes: u32,
}

impl From<&WinnerResolution> for TallySummary {
    fn from(tally: &WinnerResolution) -> Self {
        Self {
            max_votes: tally.max_votes,
            winners: tally.winners.clone(),
            is_tie: tally.is_tie,
            has_votes: tally.has_votes,
            total_votes: tally.total_votes,
        }
    }
}

#[derive(Debug, Serialize, ToSchema, Clone)]
pub struct ParticipantSummary {
    pub id: Uuid,
    pub display_name: String,
}

impl From<&Participant> for ParticipantSummary {
    fn from(participant: &Participant) -> Self {
        Self {
            id: participant.id,
            display_name: participant.display_name.clone(),
        }
    }
}

/// Round, suggestions and tally as broadcast on every fresh snapshot.
#[derive(Debug, Serialize, ToSchema, Clone)]
pub struct RoundSnapshotPayload {
    pub table: TableSummary,
    pub round: Option<RoundSummary>,
    pub suggestions: Vec<SuggestionSummary>,
    pub tally: TallySummary,
    pub participants: Vec<ParticipantSummary>,
    pub fetched_at: String,
}

impl RoundSnapshotPayload {
    pub fn new(snapshot: &RoundSnapshot, default_auto_advance: bool) -> Self {
        let tally = &snapshot.tally;
        let mut suggestions: Vec<SuggestionSummary> = snapshot
            .view
            .suggestions
            .iter()
            .map(|suggestion| {
                let (votes, percentage) = tally
                    .tallies
                    .get(&suggestion.id)
                    .map_or((0, 0), |counted| (counted.votes, counted.percentage));
                SuggestionSummary {
                    id: suggestion.id,
                    author_id: suggestion.author_id,
                    text: suggestion.text.clone(),
                    created_at: format_timestamp(suggestion.created_at),
                    votes,
                    percentage,
                    is_winner: tally.winners.contains(&suggestion.id),
                }
            })
            .collect();
        suggestions.sort_by_key(|suggestion| {
            tally
                .tallies
                .get_index_of(&suggestion.id)
                .unwrap_or(usize::MAX)
        });

        Self {
            table: TableSummary::new(&snapshot.view.table, default_auto_advance),
            round: snapshot.round().map(RoundSummary::from),
            suggestions,
            tally: tally.into(),
            participants: snapshot
                .view
                .participants
                .iter()
                .map(ParticipantSummary::from)
                .collect(),
            fetched_at: format_timestamp(snapshot.view.fetched_at),
        }
    }
}

#[derive(Debug, Serialize, ToSchema, Clone, PartialEq, Eq)]
pub struct CountdownSnapshot {
    /// Whole seconds left, absent when the phase has no timer.
    pub remaining_secs: Option<u64>,
    pub deadline: Option<String>,
    pub may_be_inaccurate: bool,
}

impl From<CountdownReading> for CountdownSnapshot {
    fn from(reading: CountdownReading) -> Self {
        Self {
            remaining_secs: reading.remaining_secs,
            deadline: reading.deadline.map(format_timestamp),
            may_be_inaccurate: reading.may_be_inaccurate,
        }
    }
}

#[derive(Debug, Serialize, ToSchema, Clone)]
pub struct ConnectionSnapshot {
    /// One of `excellent`, `good`, `poor`, `disconnected`.
    pub quality: String,
    pub latency_ms: Option<u64>,
    pub sampled_at: String,
    pub warnings: Vec<String>,
}

impl From<&ConnectionSample> for ConnectionSnapshot {
    fn from(sample: &ConnectionSample) -> Self {
        Self {
            quality: sample.quality.as_str().to_string(),
            latency_ms: sample.latency_ms,
            sampled_at: format_timestamp(sample.sampled_at),
            warnings: sample.warnings.clone(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema, Clone)]
pub struct WatchdogSnapshot {
    pub last_fresh_at: String,
    pub is_stale: bool,
    pub is_panic: bool,
}

impl From<WatchdogState> for WatchdogSnapshot {
    fn from(state: WatchdogState) -> Self {
        Self {
            last_fresh_at: format_timestamp(state.last_fresh_at),
            is_stale: state.is_stale,
            is_panic: state.is_panic,
        }
    }
}

/// Full derived view returned by `GET /round`.
#[derive(Debug, Serialize, ToSchema)]
pub struct RoundStateResponse {
    /// Participant this agent acts for.
    pub participant_id: Uuid,
    pub is_host: bool,
    /// Absent until the first successful fetch.
    pub snapshot: Option<RoundSnapshotPayload>,
    pub countdown: CountdownSnapshot,
    pub connection: ConnectionSnapshot,
    pub watchdog: WatchdogSnapshot,
    /// Whether an advance request is in flight.
    pub advance_pending: bool,
    pub degraded: bool,
}

/// Outcome of casting a vote.
#[derive(Debug, Serialize, ToSchema, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VoteStatus {
    Recorded,
    /// The participant already voted in this round; not an error.
    AlreadyVoted,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VoteResponse {
    pub status: VoteStatus,
}

#[derive(Debug, Serialize, ToSchema, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AdvanceStatus {
    /// This request performed the transition.
    Advanced,
    /// Another client already moved the round.
    Noop,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AdvanceResponse {
    pub status: AdvanceStatus,
    /// Round reported current by the store.
    pub round: Option<RoundSummary>,
}

/// Suggestion accepted by the store.
#[derive(Debug, Serialize, ToSchema)]
pub struct SuggestionCreatedResponse {
    pub id: Uuid,
    pub round_id: Uuid,
    pub text: String,
    pub created_at: String,
}

impl From<SuggestionEntity> for SuggestionCreatedResponse {
    fn from(value: SuggestionEntity) -> Self {
        Self {
            id: value.id,
            round_id: value.round_id,
            text: value.text,
            created_at: format_timestamp(value.created_at),
        }
    }
}

/// Generic acknowledgement for fire-and-forget actions.
#[derive(Debug, Serialize, ToSchema)]
pub struct ActionResponse {
    pub message: String,
}

impl ActionResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema, Clone, PartialEq, Eq)]
pub struct CleanupSummary {
    pub affected_rounds: Vec<Uuid>,
    pub affected_tables: Vec<Uuid>,
}

impl From<CleanupSummaryEntity> for CleanupSummary {
    fn from(value: CleanupSummaryEntity) -> Self {
        Self {
            affected_rounds: value.affected_rounds,
            affected_tables: value.affected_tables,
        }
    }
}

/// Result of one cleanup run; each operation succeeds or fails on its own.
#[derive(Debug, Serialize, ToSchema, Clone, PartialEq, Eq)]
pub struct CleanupResponse {
    pub expired: Option<CleanupSummary>,
    pub recovered: Option<CleanupSummary>,
    pub errors: Vec<String>,
}
