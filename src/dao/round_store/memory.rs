//! In-process round store.
//!
//! Serves as the reference implementation of the store contract: the atomic advance and
//! the cleanup sweeps run under a single lock, vote uniqueness is enforced by the
//! (round, voter) key of the vote map. Used for local demos and as the store double in tests.

use std::{io, sync::Arc, time::Duration};

use dashmap::{DashMap, DashSet, mapref::entry::Entry};
use futures::future::BoxFuture;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::{
    dao::{
        models::{
            AdvanceEventEntity, AdvanceOutcomeEntity, AdvanceRequestEntity, CleanupSummaryEntity,
            NewSuggestionEntity, NewVoteEntity, ParticipantEntity, PhaseEntity, ProbeEntity,
            RoundEntity, SuggestionEntity, TableEntity, TableSnapshotEntity, VoteEntity,
            VoteInsertEntity,
        },
        round_store::RoundStore,
        storage::{StorageError, StorageResult},
    },
    state::time_source::{SharedTimeSource, TimeSource},
};

/// Operations whose failure can be simulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryOperation {
    FetchTable,
    InsertSuggestion,
    InsertVote,
    AdvanceRound,
    ExpireRounds,
    RecoverStuckTables,
    Probe,
}

#[derive(Clone)]
pub struct MemoryRoundStore {
    inner: Arc<Inner>,
}

struct Inner {
    time: SharedTimeSource,
    tables: DashMap<Uuid, TableEntity>,
    participants: DashMap<Uuid, ParticipantEntity>,
    rounds: Mutex<Vec<RoundEntity>>,
    suggestions: DashMap<Uuid, SuggestionEntity>,
    votes: DashMap<(Uuid, Uuid), VoteEntity>,
    failing: DashSet<MemoryOperation>,
    delays: DashMap<MemoryOperation, Duration>,
}

impl MemoryRoundStore {
    /// Create an empty store stamping records with `time`.
    pub fn new(time: SharedTimeSource) -> Self {
        Self {
            inner: Arc::new(Inner {
                time,
                tables: DashMap::new(),
                participants: DashMap::new(),
                rounds: Mutex::new(Vec::new()),
                suggestions: DashMap::new(),
                votes: DashMap::new(),
                failing: DashSet::new(),
                delays: DashMap::new(),
            }),
        }
    }

    /// Create a table hosted by `host_id` with a first round waiting in the lobby.
    pub async fn create_table(
        &self,
        table_id: Uuid,
        name: &str,
        host_id: Uuid,
        host_name: &str,
        auto_advance: bool,
    ) -> RoundEntity {
        self.inner.tables.insert(
            table_id,
            TableEntity {
                id: table_id,
                name: name.to_string(),
                host_id,
                auto_advance: Some(auto_advance),
            },
        );
        self.join_table(table_id, host_id, host_name);

        let round = RoundEntity {
            id: Uuid::new_v4(),
            table_id,
            sequence: 1,
            phase: PhaseEntity::Lobby,
            deadline: None,
            winner_id: None,
        };
        self.inner.rounds.lock().await.push(round.clone());
        round
    }

    /// Register a participant at a table.
    pub fn join_table(&self, table_id: Uuid, participant_id: Uuid, display_name: &str) {
        self.inner.participants.insert(
            participant_id,
            ParticipantEntity {
                id: participant_id,
                table_id,
                display_name: display_name.to_string(),
                joined_at: self.inner.time.now(),
            },
        );
    }

    /// Insert or replace a round record as-is.
    pub async fn put_round(&self, round: RoundEntity) {
        let mut rounds = self.inner.rounds.lock().await;
        match rounds.iter_mut().find(|existing| existing.id == round.id) {
            Some(existing) => *existing = round,
            None => rounds.push(round),
        }
    }

    /// All rounds of a table ordered by sequence.
    pub async fn rounds_of(&self, table_id: Uuid) -> Vec<RoundEntity> {
        let rounds = self.inner.rounds.lock().await;
        let mut owned: Vec<RoundEntity> = rounds
            .iter()
            .filter(|round| round.table_id == table_id)
            .cloned()
            .collect();
        owned.sort_by_key(|round| round.sequence);
        owned
    }

    /// Make every subsequent call of `operation` fail (or succeed again).
    pub fn set_failing(&self, operation: MemoryOperation, failing: bool) {
        if failing {
            self.inner.failing.insert(operation);
        } else {
            self.inner.failing.remove(&operation);
        }
    }

    /// Delay applied to every call of `operation`, simulating network round-trip time.
    pub fn set_delay(&self, operation: MemoryOperation, delay: Duration) {
        if delay.is_zero() {
            self.inner.delays.remove(&operation);
        } else {
            self.inner.delays.insert(operation, delay);
        }
    }
}

impl Inner {
    async fn check(&self, operation: MemoryOperation) -> StorageResult<()> {
        let delay = self.delays.get(&operation).map(|entry| *entry.value());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.contains(&operation) {
            return Err(StorageError::unavailable(
                format!("{operation:?} failed"),
                io::Error::other("simulated outage"),
            ));
        }
        Ok(())
    }

    fn latest_round<'a>(rounds: &'a mut [RoundEntity], table_id: Uuid) -> Option<&'a mut RoundEntity> {
        rounds
            .iter_mut()
            .filter(|round| round.table_id == table_id)
            .max_by_key(|round| round.sequence)
    }

    async fn phase_of(&self, round_id: Uuid) -> StorageResult<PhaseEntity> {
        let rounds = self.rounds.lock().await;
        rounds
            .iter()
            .find(|round| round.id == round_id)
            .map(|round| round.phase)
            .ok_or_else(|| StorageError::rejected(format!("round `{round_id}` does not exist")))
    }

    async fn advance(&self, request: AdvanceRequestEntity) -> StorageResult<AdvanceOutcomeEntity> {
        let host_id = self
            .tables
            .get(&request.table_id)
            .map(|table| table.host_id)
            .ok_or_else(|| {
                StorageError::rejected(format!("table `{}` does not exist", request.table_id))
            })?;

        let mut rounds = self.rounds.lock().await;
        let Some(current) = Self::latest_round(&mut rounds, request.table_id) else {
            return Ok(AdvanceOutcomeEntity::Noop { round: None });
        };

        if current.id != request.round_id || current.phase != request.from_phase {
            debug!(
                table_id = %request.table_id,
                requested = ?request.event,
                "advance request is stale; reporting current round"
            );
            return Ok(AdvanceOutcomeEntity::Noop {
                round: Some(current.clone()),
            });
        }

        let next_round = match (current.phase, request.event) {
            (PhaseEntity::Lobby, AdvanceEventEntity::StartRound) => {
                current.phase = PhaseEntity::Suggest;
                current.deadline = request.deadline;
                return Ok(AdvanceOutcomeEntity::Advanced {
                    round: current.clone(),
                });
            }
            (PhaseEntity::Suggest, AdvanceEventEntity::CloseSuggestions) => {
                current.phase = PhaseEntity::Vote;
                current.deadline = request.deadline;
                return Ok(AdvanceOutcomeEntity::Advanced {
                    round: current.clone(),
                });
            }
            (PhaseEntity::Vote, AdvanceEventEntity::CloseVoting) => {
                current.phase = PhaseEntity::Result;
                current.deadline = None;
                return Ok(AdvanceOutcomeEntity::Advanced {
                    round: current.clone(),
                });
            }
            (PhaseEntity::Result, AdvanceEventEntity::NextRound) => RoundEntity {
                id: Uuid::new_v4(),
                table_id: current.table_id,
                sequence: current.sequence + 1,
                phase: PhaseEntity::Suggest,
                deadline: request.deadline,
                winner_id: None,
            },
            (PhaseEntity::Result, AdvanceEventEntity::TieBreak) => {
                if request.requester_id != host_id {
                    return Err(StorageError::rejected("only the host may break a tie"));
                }
                let Some(winner_id) = request.winner_id else {
                    return Err(StorageError::rejected("tie-break requires a winner"));
                };
                let belongs = self
                    .suggestions
                    .get(&winner_id)
                    .is_some_and(|suggestion| suggestion.round_id == current.id);
                if !belongs {
                    return Err(StorageError::rejected(format!(
                        "suggestion `{winner_id}` is not part of the round"
                    )));
                }
                current.winner_id = Some(winner_id);
                RoundEntity {
                    id: Uuid::new_v4(),
                    table_id: current.table_id,
                    sequence: current.sequence + 1,
                    phase: PhaseEntity::Suggest,
                    deadline: request.deadline,
                    winner_id: None,
                }
            }
            (phase, event) => {
                return Err(StorageError::rejected(format!(
                    "{event:?} cannot be applied while in {phase:?}"
                )));
            }
        };

        rounds.push(next_round.clone());
        Ok(AdvanceOutcomeEntity::Advanced { round: next_round })
    }

    async fn expire(&self) -> CleanupSummaryEntity {
        let now = self.time.now();
        let mut rounds = self.rounds.lock().await;
        let mut summary = CleanupSummaryEntity::default();
        for round in rounds.iter_mut() {
            let open = matches!(round.phase, PhaseEntity::Suggest | PhaseEntity::Vote);
            let expired = round.deadline.is_some_and(|deadline| deadline <= now);
            if open && expired {
                round.phase = PhaseEntity::Result;
                round.deadline = None;
                summary.affected_rounds.push(round.id);
            }
        }
        summary
    }

    async fn recover(&self) -> CleanupSummaryEntity {
        let mut rounds = self.rounds.lock().await;
        let mut summary = CleanupSummaryEntity::default();
        for table in self.tables.iter() {
            let Some(latest) = rounds
                .iter()
                .filter(|round| round.table_id == *table.key())
                .map(|round| round.sequence)
                .max()
            else {
                continue;
            };
            let mut touched = false;
            for round in rounds.iter_mut().filter(|round| {
                round.table_id == *table.key()
                    && round.sequence < latest
                    && round.phase != PhaseEntity::Result
            }) {
                round.phase = PhaseEntity::Result;
                round.deadline = None;
                summary.affected_rounds.push(round.id);
                touched = true;
            }
            if touched {
                summary.affected_tables.push(*table.key());
            }
        }
        summary
    }
}

impl RoundStore for MemoryRoundStore {
    fn fetch_table(
        &self,
        table_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<TableSnapshotEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.check(MemoryOperation::FetchTable).await?;
            let Some(table) = inner.tables.get(&table_id).map(|entry| entry.clone()) else {
                return Ok(None);
            };

            let round = {
                let mut rounds = inner.rounds.lock().await;
                Inner::latest_round(&mut rounds, table_id).map(|round| round.clone())
            };

            let (mut suggestions, mut votes) = match &round {
                Some(round) => (
                    inner
                        .suggestions
                        .iter()
                        .filter(|entry| entry.round_id == round.id)
                        .map(|entry| entry.value().clone())
                        .collect::<Vec<_>>(),
                    inner
                        .votes
                        .iter()
                        .filter(|entry| entry.round_id == round.id)
                        .map(|entry| entry.value().clone())
                        .collect::<Vec<_>>(),
                ),
                None => (Vec::new(), Vec::new()),
            };
            suggestions.sort_by_key(|suggestion| (suggestion.created_at, suggestion.id));
            votes.sort_by_key(|vote| (vote.created_at, vote.id));

            let mut participants: Vec<ParticipantEntity> = inner
                .participants
                .iter()
                .filter(|entry| entry.table_id == table_id)
                .map(|entry| entry.value().clone())
                .collect();
            participants.sort_by_key(|participant| participant.joined_at);

            Ok(Some(TableSnapshotEntity {
                table,
                round,
                suggestions,
                votes,
                participants,
            }))
        })
    }

    fn insert_suggestion(
        &self,
        suggestion: NewSuggestionEntity,
    ) -> BoxFuture<'static, StorageResult<SuggestionEntity>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.check(MemoryOperation::InsertSuggestion).await?;
            if inner.phase_of(suggestion.round_id).await? != PhaseEntity::Suggest {
                return Err(StorageError::rejected("round is not accepting suggestions"));
            }
            let entity = SuggestionEntity {
                id: Uuid::new_v4(),
                round_id: suggestion.round_id,
                author_id: suggestion.author_id,
                text: suggestion.text,
                created_at: inner.time.now(),
            };
            inner.suggestions.insert(entity.id, entity.clone());
            Ok(entity)
        })
    }

    fn insert_vote(&self, vote: NewVoteEntity) -> BoxFuture<'static, StorageResult<VoteInsertEntity>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.check(MemoryOperation::InsertVote).await?;
            if inner.phase_of(vote.round_id).await? != PhaseEntity::Vote {
                return Err(StorageError::rejected("round is not accepting votes"));
            }
            match inner.votes.entry((vote.round_id, vote.voter_id)) {
                Entry::Occupied(_) => Ok(VoteInsertEntity::Duplicate),
                Entry::Vacant(slot) => {
                    let entity = VoteEntity {
                        id: Uuid::new_v4(),
                        round_id: vote.round_id,
                        voter_id: vote.voter_id,
                        suggestion_id: vote.suggestion_id,
                        created_at: inner.time.now(),
                    };
                    slot.insert(entity.clone());
                    Ok(VoteInsertEntity::Inserted(entity))
                }
            }
        })
    }

    fn advance_round(
        &self,
        request: AdvanceRequestEntity,
    ) -> BoxFuture<'static, StorageResult<AdvanceOutcomeEntity>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.check(MemoryOperation::AdvanceRound).await?;
            inner.advance(request).await
        })
    }

    fn expire_rounds(&self) -> BoxFuture<'static, StorageResult<CleanupSummaryEntity>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.check(MemoryOperation::ExpireRounds).await?;
            Ok(inner.expire().await)
        })
    }

    fn recover_stuck_tables(&self) -> BoxFuture<'static, StorageResult<CleanupSummaryEntity>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.check(MemoryOperation::RecoverStuckTables).await?;
            Ok(inner.recover().await)
        })
    }

    fn probe(&self) -> BoxFuture<'static, StorageResult<ProbeEntity>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.check(MemoryOperation::Probe).await?;
            Ok(ProbeEntity {
                server_time: inner.time.now(),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::state::time_source::ManualTimeSource;

    async fn store_with_table() -> (MemoryRoundStore, Arc<ManualTimeSource>, Uuid, Uuid, RoundEntity) {
        let clock = ManualTimeSource::new(datetime!(2026-03-01 18:00:00 UTC));
        let store = MemoryRoundStore::new(clock.clone());
        let table_id = Uuid::new_v4();
        let host_id = Uuid::new_v4();
        let lobby = store
            .create_table(table_id, "friday", host_id, "host", true)
            .await;
        (store, clock, table_id, host_id, lobby)
    }

    fn request(round: &RoundEntity, requester_id: Uuid, event: AdvanceEventEntity) -> AdvanceRequestEntity {
        AdvanceRequestEntity {
            table_id: round.table_id,
            round_id: round.id,
            from_phase: round.phase,
            requester_id,
            event,
            deadline: None,
            winner_id: None,
        }
    }

    #[tokio::test]
    async fn concurrent_next_round_requests_create_exactly_one_round() {
        let (store, _clock, table_id, host_id, lobby) = store_with_table().await;
        store
            .put_round(RoundEntity {
                phase: PhaseEntity::Result,
                ..lobby.clone()
            })
            .await;
        let result_round = RoundEntity {
            phase: PhaseEntity::Result,
            ..lobby
        };

        let first = store.advance_round(request(&result_round, host_id, AdvanceEventEntity::NextRound));
        let second = store.advance_round(request(
            &result_round,
            Uuid::new_v4(),
            AdvanceEventEntity::NextRound,
        ));
        let (first, second) = tokio::join!(first, second);

        let advanced = [first.unwrap(), second.unwrap()]
            .into_iter()
            .filter(|outcome| matches!(outcome, AdvanceOutcomeEntity::Advanced { .. }))
            .count();
        assert_eq!(advanced, 1);
        assert_eq!(store.rounds_of(table_id).await.len(), 2);
    }

    #[tokio::test]
    async fn second_vote_by_same_voter_is_a_duplicate() {
        let (store, _clock, _table_id, host_id, lobby) = store_with_table().await;
        store
            .put_round(RoundEntity {
                phase: PhaseEntity::Vote,
                ..lobby.clone()
            })
            .await;
        let vote = NewVoteEntity {
            round_id: lobby.id,
            voter_id: host_id,
            suggestion_id: Uuid::new_v4(),
        };

        assert!(matches!(
            store.insert_vote(vote.clone()).await.unwrap(),
            VoteInsertEntity::Inserted(_)
        ));
        assert_eq!(
            store.insert_vote(vote).await.unwrap(),
            VoteInsertEntity::Duplicate
        );
    }

    #[tokio::test]
    async fn expired_suggest_round_is_forced_to_result() {
        let (store, clock, table_id, _host_id, lobby) = store_with_table().await;
        store
            .put_round(RoundEntity {
                phase: PhaseEntity::Suggest,
                deadline: Some(clock.now() - Duration::from_secs(30)),
                ..lobby.clone()
            })
            .await;

        let summary = store.expire_rounds().await.unwrap();

        assert_eq!(summary.affected_rounds, vec![lobby.id]);
        let round = store.rounds_of(table_id).await.remove(0);
        assert_eq!(round.phase, PhaseEntity::Result);
        assert_eq!(round.deadline, None);
    }

    #[tokio::test]
    async fn stale_request_is_a_noop_reporting_current_round() {
        let (store, _clock, _table_id, host_id, lobby) = store_with_table().await;
        let start = request(&lobby, host_id, AdvanceEventEntity::StartRound);

        let first = store.advance_round(start.clone()).await.unwrap();
        let second = store.advance_round(start).await.unwrap();

        assert!(matches!(first, AdvanceOutcomeEntity::Advanced { .. }));
        match second {
            AdvanceOutcomeEntity::Noop { round: Some(round) } => {
                assert_eq!(round.phase, PhaseEntity::Suggest)
            }
            other => panic!("expected noop, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn tie_break_is_reserved_to_the_host() {
        let (store, _clock, _table_id, _host_id, lobby) = store_with_table().await;
        let result_round = RoundEntity {
            phase: PhaseEntity::Result,
            ..lobby
        };
        store.put_round(result_round.clone()).await;

        let mut tie_break = request(&result_round, Uuid::new_v4(), AdvanceEventEntity::TieBreak);
        tie_break.winner_id = Some(Uuid::new_v4());

        let err = store.advance_round(tie_break).await.unwrap_err();
        assert!(matches!(err, StorageError::Rejected { .. }));
    }

    #[tokio::test]
    async fn recover_closes_older_open_rounds() {
        let (store, _clock, table_id, _host_id, lobby) = store_with_table().await;
        store
            .put_round(RoundEntity {
                phase: PhaseEntity::Vote,
                ..lobby.clone()
            })
            .await;
        store
            .put_round(RoundEntity {
                id: Uuid::new_v4(),
                table_id,
                sequence: 2,
                phase: PhaseEntity::Suggest,
                deadline: None,
                winner_id: None,
            })
            .await;

        let summary = store.recover_stuck_tables().await.unwrap();

        assert_eq!(summary.affected_rounds, vec![lobby.id]);
        assert_eq!(summary.affected_tables, vec![table_id]);
    }

    #[tokio::test]
    async fn simulated_outage_fails_only_the_selected_operation() {
        let (store, _clock, table_id, _host_id, _lobby) = store_with_table().await;
        store.set_failing(MemoryOperation::ExpireRounds, true);

        assert!(store.expire_rounds().await.unwrap_err().is_transient());
        assert!(store.fetch_table(table_id).await.unwrap().is_some());
    }
}
