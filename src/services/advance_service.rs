//! Advance requests: host actions, tie-breaks, local deadline expiry and the auto-advance
//! countdown. Every path ends in the store's atomic advance operation.

use std::{sync::Arc, time::Duration};

use tokio::{
    sync::watch,
    time::{MissedTickBehavior, interval},
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::models::{AdvanceOutcomeEntity, AdvanceRequestEntity},
    dto::{
        round::{AdvanceResponse, AdvanceStatus, RoundSummary},
        sse::{AdvanceTrigger, AutoAdvanceStatus},
    },
    error::ServiceError,
    services::{round_service, sse_events},
    state::{
        SharedState,
        advance::{
            AutoAdvanceTarget, auto_advance_target, check_host_advance, check_tie_break,
            expiry_event, next_deadline,
        },
        clock_sync::CountdownReading,
        round::{Round, RoundPhase, RoundSnapshot},
        state_machine::RoundEvent,
        transitions::run_transition_with_refresh,
    },
};

/// Ask the store to perform `event` on the round this agent last observed.
///
/// At most one request is in flight per agent. A failure is broadcast as `advance.failed` and
/// returned; nothing is retried here, the next eligible snapshot triggers again.
pub async fn request_advance(
    state: &SharedState,
    event: RoundEvent,
    trigger: AdvanceTrigger,
) -> Result<AdvanceResponse, ServiceError> {
    let result = send_advance(state, event).await;

    match &result {
        Ok(response) => info!(
            event = event.as_str(),
            ?trigger,
            status = ?response.status,
            "advance request completed"
        ),
        Err(err) => {
            warn!(event = event.as_str(), ?trigger, error = %err, "advance request failed");
            let recoverable = !matches!(
                err,
                ServiceError::Forbidden(_) | ServiceError::InvalidInput(_)
            );
            sse_events::broadcast_advance_failed(state, event, trigger, err.to_string(), recoverable);
        }
    }

    result
}

async fn send_advance(state: &SharedState, event: RoundEvent) -> Result<AdvanceResponse, ServiceError> {
    let store = state.require_round_store().await?;
    let identity = state.identity();
    let config = state.config();
    let deadline = next_deadline(event, state.now(), config.suggest_duration, config.vote_duration);
    let winner_id = match event {
        RoundEvent::TieBreak { winner_id } => Some(winner_id),
        _ => None,
    };

    run_transition_with_refresh(state, event, |plan| async move {
        let request = AdvanceRequestEntity {
            table_id: identity.table_id,
            round_id: plan.round_id,
            from_phase: plan.from.into(),
            requester_id: identity.participant_id,
            event: event.into(),
            deadline,
            winner_id,
        };
        let outcome = store.advance_round(request).await?;
        Ok(match outcome {
            AdvanceOutcomeEntity::Advanced { round } => AdvanceResponse {
                status: AdvanceStatus::Advanced,
                round: Some(RoundSummary::from(&Round::from(round))),
            },
            AdvanceOutcomeEntity::Noop { round } => AdvanceResponse {
                status: AdvanceStatus::Noop,
                round: round.map(|round| RoundSummary::from(&Round::from(round))),
            },
        })
    })
    .await
}

/// Manual transition requested through the host controls.
pub async fn manual_advance(
    state: &SharedState,
    event: RoundEvent,
) -> Result<AdvanceResponse, ServiceError> {
    let snapshot = round_service::current_snapshot(state).await?;
    check_host_advance(&snapshot, state.identity().participant_id, event)?;
    request_advance(state, event, AdvanceTrigger::Host).await
}

/// Host pick among tied winners; records the winner and opens the next round.
pub async fn tie_break(state: &SharedState, winner_id: Uuid) -> Result<AdvanceResponse, ServiceError> {
    let snapshot = round_service::current_snapshot(state).await?;
    check_tie_break(&snapshot, state.identity().participant_id, winner_id)?;
    request_advance(state, RoundEvent::TieBreak { winner_id }, AdvanceTrigger::TieBreak).await
}

/// Stop a running auto-advance countdown. The round it belonged to will not count down again.
pub fn cancel_auto_advance(state: &SharedState) {
    state.auto_advance_cancel().notify_waiters();
}

#[derive(Debug, Default)]
struct AdvanceTracker {
    /// Round and phase whose expiry was already requested for the current snapshot.
    expiry_attempted: Option<(Uuid, RoundPhase)>,
    /// Round whose auto-advance countdown already ran (or was cancelled).
    auto_handled: Option<Uuid>,
}

enum CountdownEnd {
    Cancelled,
    Ineligible,
    Completed,
    Closed,
}

/// Watch snapshots and the countdown, requesting phase closes on expiry and running the
/// auto-advance countdown for eligible results.
pub async fn run(state: SharedState) {
    let mut snapshots = state.snapshot_watcher();
    let mut countdowns = state.countdown_watcher();
    let mut tracker = AdvanceTracker::default();

    loop {
        if let Some(snapshot) = state.snapshot() {
            match auto_advance_target(&snapshot, state.config().auto_advance_default) {
                Some(target) if tracker.auto_handled != Some(target.round_id) => {
                    tracker.auto_handled = Some(target.round_id);
                    match run_countdown(&state, target, &mut snapshots).await {
                        CountdownEnd::Completed => {
                            if request_advance(&state, RoundEvent::NextRound, AdvanceTrigger::AutoAdvance)
                                .await
                                .is_err()
                            {
                                // Let the next eligible snapshot start over.
                                tracker.auto_handled = None;
                            }
                        }
                        CountdownEnd::Ineligible => tracker.auto_handled = None,
                        CountdownEnd::Cancelled => {}
                        CountdownEnd::Closed => break,
                    }
                    continue;
                }
                Some(_) => {}
                None => {
                    let due = expiry_due(&snapshot, state.countdown()).filter(|(round_id, phase, _)| {
                        tracker.expiry_attempted != Some((*round_id, *phase))
                    });
                    if let Some((round_id, phase, event)) = due {
                        tracker.expiry_attempted = Some((round_id, phase));
                        debug!(%round_id, %phase, "local countdown reached zero");
                        let _ = request_advance(&state, event, AdvanceTrigger::Expiry).await;
                    }
                }
            }
        }

        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                tracker.expiry_attempted = None;
            }
            changed = countdowns.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
}

/// Close event for a timed phase whose countdown for the current deadline reached zero.
fn expiry_due(
    snapshot: &RoundSnapshot,
    countdown: CountdownReading,
) -> Option<(Uuid, RoundPhase, RoundEvent)> {
    let round = snapshot.round()?;
    let event = expiry_event(round.phase)?;
    let deadline = round.deadline?;
    let reached = countdown.deadline == Some(deadline) && countdown.remaining_secs == Some(0);
    reached.then_some((round.id, round.phase, event))
}

async fn run_countdown(
    state: &SharedState,
    target: AutoAdvanceTarget,
    snapshots: &mut watch::Receiver<Option<Arc<RoundSnapshot>>>,
) -> CountdownEnd {
    let cancelled = state.auto_advance_cancel().notified();
    tokio::pin!(cancelled);

    let mut remaining = state.config().auto_advance_countdown.as_secs();
    let mut ticker = interval(Duration::from_secs(1));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    info!(round_id = %target.round_id, winner_id = %target.winner_id, remaining, "auto-advance countdown started");

    if remaining > 0 {
        sse_events::broadcast_auto_advance(state, target.round_id, AutoAdvanceStatus::Running, remaining);
    }
    while remaining > 0 {
        tokio::select! {
            _ = &mut cancelled => {
                info!(round_id = %target.round_id, "auto-advance cancelled");
                sse_events::broadcast_auto_advance(state, target.round_id, AutoAdvanceStatus::Cancelled, remaining);
                return CountdownEnd::Cancelled;
            }
            changed = snapshots.changed() => {
                if changed.is_err() {
                    return CountdownEnd::Closed;
                }
                let still_eligible = state
                    .snapshot()
                    .and_then(|snapshot| auto_advance_target(&snapshot, state.config().auto_advance_default))
                    == Some(target);
                if !still_eligible {
                    debug!(round_id = %target.round_id, "round no longer eligible for auto-advance");
                    sse_events::broadcast_auto_advance(state, target.round_id, AutoAdvanceStatus::Cancelled, remaining);
                    return CountdownEnd::Ineligible;
                }
            }
            _ = ticker.tick() => {
                remaining -= 1;
                if remaining > 0 {
                    sse_events::broadcast_auto_advance(state, target.round_id, AutoAdvanceStatus::Running, remaining);
                }
            }
        }
    }

    sse_events::broadcast_auto_advance(state, target.round_id, AutoAdvanceStatus::Fired, 0);
    CountdownEnd::Completed
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{models::PhaseEntity, round_store::memory::MemoryOperation},
        services::{round_service, test_support::Harness},
        state::time_source::TimeSource,
    };

    /// Host agent whose round finished with `suggestion` as the single winner.
    async fn finished_round(config: AppConfig) -> (Harness, Uuid) {
        let harness = Harness::host(config).await;
        harness.force_phase(PhaseEntity::Suggest).await;
        let suggestion = round_service::submit_suggestion(&harness.state, "tacos")
            .await
            .unwrap();
        harness.force_phase(PhaseEntity::Vote).await;
        round_service::cast_vote(&harness.state, suggestion.id)
            .await
            .unwrap();
        harness.force_phase(PhaseEntity::Result).await;
        (harness, suggestion.id)
    }

    #[tokio::test]
    async fn concurrent_next_round_requests_advance_once() {
        let (harness, _) = finished_round(AppConfig::default()).await;
        let guest = harness.guest().await;
        round_service::refresh(&guest).await.unwrap();

        let (host_result, guest_result) = tokio::join!(
            request_advance(&harness.state, RoundEvent::NextRound, AdvanceTrigger::AutoAdvance),
            request_advance(&guest, RoundEvent::NextRound, AdvanceTrigger::AutoAdvance),
        );

        let mut statuses = vec![host_result.unwrap().status, guest_result.unwrap().status];
        statuses.sort_by_key(|status| *status == AdvanceStatus::Noop);
        assert_eq!(statuses, vec![AdvanceStatus::Advanced, AdvanceStatus::Noop]);

        let rounds = harness.store.rounds_of(harness.table_id).await;
        assert_eq!(rounds.len(), 2);
        assert_eq!(rounds[1].phase, PhaseEntity::Suggest);
        assert_eq!(rounds[1].sequence, 2);
    }

    #[tokio::test]
    async fn guest_cannot_advance_manually() {
        let harness = Harness::host(AppConfig::default()).await;
        let guest = harness.guest().await;

        let err = manual_advance(&guest, RoundEvent::StartRound).await.unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }

    #[tokio::test]
    async fn host_start_sets_suggest_deadline() {
        let harness = Harness::host(AppConfig::default()).await;

        let response = manual_advance(&harness.state, RoundEvent::StartRound)
            .await
            .unwrap();

        assert_eq!(response.status, AdvanceStatus::Advanced);
        let rounds = harness.store.rounds_of(harness.table_id).await;
        assert_eq!(rounds[0].phase, PhaseEntity::Suggest);
        assert_eq!(
            rounds[0].deadline,
            Some(harness.clock.now() + Duration::from_secs(60))
        );
    }

    #[tokio::test]
    async fn failed_request_is_broadcast_and_clears_in_flight_guard() {
        let (harness, _) = finished_round(AppConfig::default()).await;
        harness.store.set_failing(MemoryOperation::AdvanceRound, true);
        let mut events = harness.state.sse().subscribe();

        let err = request_advance(&harness.state, RoundEvent::NextRound, AdvanceTrigger::AutoAdvance)
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::Unavailable(_)));
        let event = events.recv().await.unwrap();
        assert_eq!(event.event.as_deref(), Some("advance.failed"));
        assert!(event.data.contains("\"recoverable\":true"));
        assert_eq!(harness.state.round_machine().await.pending, None);
    }

    #[tokio::test]
    async fn tie_break_records_pick_and_opens_next_round() {
        let harness = Harness::host(AppConfig::default()).await;
        let guest = harness.guest().await;
        harness.force_phase(PhaseEntity::Suggest).await;
        let first = round_service::submit_suggestion(&harness.state, "tacos")
            .await
            .unwrap();
        let second = round_service::submit_suggestion(&harness.state, "ramen")
            .await
            .unwrap();
        harness.force_phase(PhaseEntity::Vote).await;
        round_service::refresh(&guest).await.unwrap();
        round_service::cast_vote(&harness.state, first.id).await.unwrap();
        round_service::cast_vote(&guest, second.id).await.unwrap();
        harness.force_phase(PhaseEntity::Result).await;

        assert!(matches!(
            tie_break(&harness.state, Uuid::new_v4()).await,
            Err(ServiceError::InvalidInput(_))
        ));
        let response = tie_break(&harness.state, second.id).await.unwrap();

        assert_eq!(response.status, AdvanceStatus::Advanced);
        let rounds = harness.store.rounds_of(harness.table_id).await;
        assert_eq!(rounds[0].winner_id, Some(second.id));
        assert_eq!(rounds[1].phase, PhaseEntity::Suggest);
    }

    #[tokio::test(start_paused = true)]
    async fn auto_advance_fires_after_countdown() {
        let (harness, _) = finished_round(AppConfig::default()).await;
        let mut events = harness.state.sse().subscribe();

        let task = tokio::spawn(run(harness.state.clone()));
        tokio::time::sleep(Duration::from_millis(3_500)).await;

        let rounds = harness.store.rounds_of(harness.table_id).await;
        assert_eq!(rounds.len(), 2);

        let mut statuses = Vec::new();
        while let Ok(event) = events.try_recv() {
            if event.event.as_deref() == Some("auto_advance") {
                let payload: serde_json::Value = serde_json::from_str(&event.data).unwrap();
                statuses.push(payload["remaining_secs"].as_u64().unwrap());
            }
        }
        assert_eq!(statuses, vec![3, 2, 1, 0]);
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_host_request_releases_the_in_flight_guard() {
        let harness = Harness::host(AppConfig::default()).await;
        harness
            .store
            .set_delay(MemoryOperation::AdvanceRound, Duration::from_secs(2));

        let state = harness.state.clone();
        let request =
            tokio::spawn(async move { manual_advance(&state, RoundEvent::StartRound).await });
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(
            harness.state.round_machine().await.pending,
            Some(RoundEvent::StartRound)
        );

        request.abort();
        assert!(request.await.unwrap_err().is_cancelled());
        assert_eq!(harness.state.round_machine().await.pending, None);

        harness
            .store
            .set_delay(MemoryOperation::AdvanceRound, Duration::ZERO);
        let response = manual_advance(&harness.state, RoundEvent::StartRound)
            .await
            .unwrap();
        assert_eq!(response.status, AdvanceStatus::Advanced);
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_changes_do_not_repeat_countdown_events() {
        let (harness, _) = finished_round(AppConfig::default()).await;
        let mut events = harness.state.sse().subscribe();

        let task = tokio::spawn(run(harness.state.clone()));
        tokio::time::sleep(Duration::from_millis(200)).await;
        for _ in 0..3 {
            round_service::refresh(&harness.state).await.unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        tokio::time::sleep(Duration::from_millis(1_000)).await;

        let mut statuses = Vec::new();
        while let Ok(event) = events.try_recv() {
            if event.event.as_deref() == Some("auto_advance") {
                let payload: serde_json::Value = serde_json::from_str(&event.data).unwrap();
                statuses.push(payload["remaining_secs"].as_u64().unwrap());
            }
        }
        assert_eq!(statuses, vec![3, 2]);
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_auto_advance_does_not_fire() {
        let (harness, _) = finished_round(AppConfig::default()).await;

        let task = tokio::spawn(run(harness.state.clone()));
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        cancel_auto_advance(&harness.state);
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(harness.store.rounds_of(harness.table_id).await.len(), 1);
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn result_without_winner_never_auto_advances() {
        let harness = Harness::host(AppConfig::default()).await;
        harness.force_phase(PhaseEntity::Result).await;

        let task = tokio::spawn(run(harness.state.clone()));
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(harness.store.rounds_of(harness.table_id).await.len(), 1);
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn zero_countdown_closes_suggestions() {
        let harness = Harness::host(AppConfig::default()).await;
        harness.force_phase(PhaseEntity::Suggest).await;
        let deadline = harness.state.snapshot().and_then(|s| s.round().and_then(|r| r.deadline));

        let task = tokio::spawn(run(harness.state.clone()));
        tokio::task::yield_now().await;
        harness.state.publish_countdown(CountdownReading {
            remaining_secs: Some(0),
            deadline,
            may_be_inaccurate: false,
        });
        tokio::time::sleep(Duration::from_millis(100)).await;

        let rounds = harness.store.rounds_of(harness.table_id).await;
        assert_eq!(rounds[0].phase, PhaseEntity::Vote);
        task.abort();
    }
}
