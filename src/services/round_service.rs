use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::models::{NewSuggestionEntity, NewVoteEntity, VoteInsertEntity},
    dto::round::{
        ConnectionSnapshot, CountdownSnapshot, RoundSnapshotPayload, RoundStateResponse,
        SuggestionCreatedResponse, VoteStatus, WatchdogSnapshot,
    },
    error::ServiceError,
    services::sse_events,
    state::{
        SharedState,
        round::{RoundPhase, RoundSnapshot, TableView},
    },
};

/// Fetch the table view from the store, publish it as the fresh snapshot and broadcast it.
pub async fn refresh(state: &SharedState) -> Result<Arc<RoundSnapshot>, ServiceError> {
    let store = state.require_round_store().await?;
    let table_id = state.identity().table_id;
    let entity = store
        .fetch_table(table_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("table `{table_id}` does not exist")))?;

    let view = TableView::from_entity(entity, state.now());
    let snapshot = Arc::new(RoundSnapshot::new(view));
    state.publish_snapshot(snapshot.clone()).await;
    sse_events::broadcast_round_snapshot(state, &snapshot);
    Ok(snapshot)
}

/// Serve refresh requests one at a time until the task is aborted.
///
/// Requests raised while a fetch is running coalesce into a single follow-up fetch.
pub async fn run_refresher(state: SharedState) {
    loop {
        state.refresh_signal().notified().await;
        match refresh(&state).await {
            Ok(snapshot) => debug!(
                phase = ?snapshot.phase(),
                suggestions = snapshot.view.suggestions.len(),
                votes = snapshot.view.votes.len(),
                "refreshed table view"
            ),
            Err(ServiceError::Degraded) => debug!("refresh skipped while degraded"),
            Err(err) => warn!(error = %err, "table refresh failed; retrying on the next cycle"),
        }
    }
}

/// Cached snapshot, fetching one first if nothing was published yet.
pub async fn current_snapshot(state: &SharedState) -> Result<Arc<RoundSnapshot>, ServiceError> {
    match state.snapshot() {
        Some(snapshot) => Ok(snapshot),
        None => refresh(state).await,
    }
}

/// Submit a suggestion for the current round; only accepted during `suggest`.
pub async fn submit_suggestion(
    state: &SharedState,
    text: &str,
) -> Result<SuggestionCreatedResponse, ServiceError> {
    let snapshot = current_snapshot(state).await?;
    let round_id = require_phase(&snapshot, RoundPhase::Suggest)?;

    let store = state.require_round_store().await?;
    let created = store
        .insert_suggestion(NewSuggestionEntity {
            round_id,
            author_id: state.identity().participant_id,
            text: text.trim().to_string(),
        })
        .await?;

    info!(round_id = %round_id, suggestion_id = %created.id, "suggestion submitted");
    state.request_refresh();
    Ok(SuggestionCreatedResponse::from(created))
}

/// Cast this participant's vote; a second vote in the same round is reported, not rejected.
pub async fn cast_vote(state: &SharedState, suggestion_id: Uuid) -> Result<VoteStatus, ServiceError> {
    let snapshot = current_snapshot(state).await?;
    let round_id = require_phase(&snapshot, RoundPhase::Vote)?;
    if !snapshot.view.has_suggestion(suggestion_id) {
        return Err(ServiceError::InvalidInput(format!(
            "suggestion `{suggestion_id}` is not part of the current round"
        )));
    }

    let store = state.require_round_store().await?;
    let voter_id = state.identity().participant_id;
    let outcome = store
        .insert_vote(NewVoteEntity {
            round_id,
            voter_id,
            suggestion_id,
        })
        .await?;

    match outcome {
        VoteInsertEntity::Inserted(vote) => {
            info!(round_id = %round_id, vote_id = %vote.id, "vote recorded");
            state.request_refresh();
            Ok(VoteStatus::Recorded)
        }
        VoteInsertEntity::Duplicate => {
            debug!(round_id = %round_id, voter_id = %voter_id, "participant already voted");
            Ok(VoteStatus::AlreadyVoted)
        }
    }
}

/// Everything the UI needs to render the round, assembled from the published channels.
pub async fn current_view(state: &SharedState) -> RoundStateResponse {
    let participant_id = state.identity().participant_id;
    let snapshot = state.snapshot();
    let machine = state.round_machine().await;

    RoundStateResponse {
        participant_id,
        is_host: snapshot
            .as_ref()
            .is_some_and(|snapshot| snapshot.view.is_host(participant_id)),
        snapshot: snapshot.as_ref().map(|snapshot| {
            RoundSnapshotPayload::new(snapshot, state.config().auto_advance_default)
        }),
        countdown: CountdownSnapshot::from(state.countdown()),
        connection: ConnectionSnapshot::from(&state.connection()),
        watchdog: WatchdogSnapshot::from(state.watchdog()),
        advance_pending: machine.pending.is_some(),
        degraded: state.is_degraded().await,
    }
}

fn require_phase(snapshot: &RoundSnapshot, expected: RoundPhase) -> Result<Uuid, ServiceError> {
    match snapshot.round() {
        Some(round) if round.phase == expected => Ok(round.id),
        Some(round) => Err(ServiceError::InvalidState(format!(
            "round is in {}, expected {expected}",
            round.phase
        ))),
        None => Err(ServiceError::InvalidState("the table has no round yet".into())),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{models::PhaseEntity, round_store::memory::MemoryOperation},
        services::test_support::Harness,
    };

    #[tokio::test]
    async fn refresh_publishes_snapshot_and_tracks_phase() {
        let harness = Harness::host(AppConfig::default()).await;
        let mut watcher = harness.state.snapshot_watcher();

        let snapshot = refresh(&harness.state).await.unwrap();

        assert_eq!(snapshot.phase(), Some(RoundPhase::Lobby));
        assert!(watcher.has_changed().unwrap());
        assert_eq!(
            watcher.borrow_and_update().as_ref().map(|s| s.view.table.id),
            Some(harness.table_id)
        );
        assert_eq!(harness.state.round_machine().await.phase, Some(RoundPhase::Lobby));
    }

    #[tokio::test]
    async fn refresh_failure_keeps_previous_snapshot() {
        let harness = Harness::host(AppConfig::default()).await;
        refresh(&harness.state).await.unwrap();
        harness.store.set_failing(MemoryOperation::FetchTable, true);

        let err = refresh(&harness.state).await.unwrap_err();

        assert!(matches!(err, ServiceError::Unavailable(_)));
        assert!(harness.state.snapshot().is_some());
    }

    #[tokio::test]
    async fn suggestions_only_accepted_while_suggesting() {
        let harness = Harness::host(AppConfig::default()).await;
        refresh(&harness.state).await.unwrap();

        let err = submit_suggestion(&harness.state, "tacos").await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));

        harness.force_phase(PhaseEntity::Suggest).await;
        let created = submit_suggestion(&harness.state, "  tacos ").await.unwrap();
        assert_eq!(created.text, "tacos");
    }

    #[tokio::test]
    async fn second_vote_reports_already_voted() {
        let harness = Harness::host(AppConfig::default()).await;
        harness.force_phase(PhaseEntity::Suggest).await;
        let created = submit_suggestion(&harness.state, "pizza").await.unwrap();
        harness.force_phase(PhaseEntity::Vote).await;

        assert_eq!(
            cast_vote(&harness.state, created.id).await.unwrap(),
            VoteStatus::Recorded
        );
        assert_eq!(
            cast_vote(&harness.state, created.id).await.unwrap(),
            VoteStatus::AlreadyVoted
        );
    }

    #[tokio::test]
    async fn vote_for_unknown_suggestion_is_invalid_input() {
        let harness = Harness::host(AppConfig::default()).await;
        harness.force_phase(PhaseEntity::Vote).await;

        let err = cast_vote(&harness.state, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn view_reports_host_and_degraded_flags() {
        let harness = Harness::host(AppConfig::default()).await;
        refresh(&harness.state).await.unwrap();

        let view = current_view(&harness.state).await;
        assert!(view.is_host);
        assert!(!view.degraded);
        assert!(!view.advance_pending);

        harness.state.clear_round_store().await;
        assert!(current_view(&harness.state).await.degraded);
    }
}
