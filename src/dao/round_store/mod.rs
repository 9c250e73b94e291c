pub mod memory;
#[cfg(feature = "rest-store")]
pub mod rest;

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::models::{
    AdvanceOutcomeEntity, AdvanceRequestEntity, CleanupSummaryEntity, NewSuggestionEntity,
    NewVoteEntity, ProbeEntity, SuggestionEntity, TableSnapshotEntity, VoteInsertEntity,
};
use crate::dao::storage::StorageResult;

/// Abstraction over the shared store that owns tables, rounds, suggestions and votes.
///
/// Every mutation that several clients may race on (`insert_vote`, `advance_round`,
/// the cleanup operations) must be safe to call concurrently; implementations enforce
/// that themselves and clients never lock anything.
pub trait RoundStore: Send + Sync {
    /// Read the table with its latest round, that round's suggestions and votes, and participants.
    fn fetch_table(
        &self,
        table_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<TableSnapshotEntity>>>;
    fn insert_suggestion(
        &self,
        suggestion: NewSuggestionEntity,
    ) -> BoxFuture<'static, StorageResult<SuggestionEntity>>;
    /// Insert a vote; a (round, voter) uniqueness violation yields [`VoteInsertEntity::Duplicate`].
    fn insert_vote(&self, vote: NewVoteEntity) -> BoxFuture<'static, StorageResult<VoteInsertEntity>>;
    /// Atomic, idempotent phase advance: at most one of several concurrent identical
    /// requests reports [`AdvanceOutcomeEntity::Advanced`].
    fn advance_round(
        &self,
        request: AdvanceRequestEntity,
    ) -> BoxFuture<'static, StorageResult<AdvanceOutcomeEntity>>;
    /// Move every `suggest`/`vote` round whose deadline passed to `result` and clear its deadline.
    fn expire_rounds(&self) -> BoxFuture<'static, StorageResult<CleanupSummaryEntity>>;
    /// Broader maintenance for tables left with more than one open round.
    fn recover_stuck_tables(&self) -> BoxFuture<'static, StorageResult<CleanupSummaryEntity>>;
    /// Lightweight reachability check returning the server clock.
    fn probe(&self) -> BoxFuture<'static, StorageResult<ProbeEntity>>;
}
