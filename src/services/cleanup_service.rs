use tokio::time::{Instant, MissedTickBehavior, interval, sleep};
use tracing::{debug, info, warn};

use crate::{
    dao::{models::CleanupSummaryEntity, storage::StorageResult},
    dto::round::{CleanupResponse, CleanupSummary},
    error::ServiceError,
    services::sse_events,
    state::SharedState,
};

/// Outcome of both maintenance operations; either may fail on its own.
struct CleanupRun {
    expired: StorageResult<CleanupSummaryEntity>,
    recovered: StorageResult<CleanupSummaryEntity>,
}

impl CleanupRun {
    fn touched_rounds(&self) -> bool {
        [&self.expired, &self.recovered]
            .into_iter()
            .any(|result| matches!(result, Ok(summary) if !summary.affected_rounds.is_empty()))
    }

    fn into_report(self) -> (CleanupResponse, Option<ServiceError>) {
        let mut errors = Vec::new();
        let mut first_error = None;

        let mut keep = |operation: &str, result: StorageResult<CleanupSummaryEntity>| match result {
            Ok(summary) => Some(CleanupSummary::from(summary)),
            Err(err) => {
                errors.push(format!("{operation}: {err}"));
                first_error.get_or_insert(err);
                None
            }
        };
        let expired = keep("expire_rounds", self.expired);
        let recovered = keep("recover_stuck_tables", self.recovered);

        let both_failed = expired.is_none() && recovered.is_none();
        let report = CleanupResponse {
            expired,
            recovered,
            errors,
        };
        let error = if both_failed {
            first_error.map(ServiceError::from)
        } else {
            None
        };
        (report, error)
    }
}

async fn run_once(state: &SharedState) -> Result<CleanupRun, ServiceError> {
    let store = state.require_round_store().await?;
    let claim = state.begin_cleanup(Instant::now())?;

    let expired = store.expire_rounds().await;
    if let Err(err) = &expired {
        warn!(error = %err, "expiring overdue rounds failed");
    }
    let recovered = store.recover_stuck_tables().await;
    if let Err(err) = &recovered {
        warn!(error = %err, "recovering stuck tables failed");
    }

    drop(claim);

    let run = CleanupRun { expired, recovered };
    if run.touched_rounds() {
        state.request_refresh();
    }
    Ok(run)
}

/// Cleanup requested from the UI: the summary (or the error when both operations failed)
/// is returned and broadcast.
pub async fn run_manual(state: &SharedState) -> Result<CleanupResponse, ServiceError> {
    let run = run_once(state).await?;
    let (report, error) = run.into_report();
    sse_events::broadcast_cleanup(state, "manual", &report);
    match error {
        Some(err) => Err(err),
        None => Ok(report),
    }
}

/// Periodic cleanup: one delayed run after start, then a fixed interval. Failures are logged.
pub async fn run(state: SharedState) {
    sleep(state.config().cleanup_initial_delay).await;
    let mut ticker = interval(state.config().cleanup_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match run_once(&state).await {
            Ok(run) => {
                let (report, _) = run.into_report();
                info!(
                    expired = report.expired.as_ref().map_or(0, |s| s.affected_rounds.len()),
                    recovered = report.recovered.as_ref().map_or(0, |s| s.affected_rounds.len()),
                    failures = report.errors.len(),
                    "scheduled cleanup finished"
                );
            }
            Err(err) => debug!(error = %err, "scheduled cleanup skipped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{models::PhaseEntity, round_store::memory::MemoryOperation},
        services::test_support::Harness,
    };

    #[tokio::test(start_paused = true)]
    async fn one_failing_operation_does_not_abort_the_other() {
        let harness = Harness::host(AppConfig::default()).await;
        harness.force_phase(PhaseEntity::Suggest).await;
        harness.clock.advance(Duration::from_secs(31));
        harness.store.set_failing(MemoryOperation::RecoverStuckTables, true);

        let report = run_manual(&harness.state).await.unwrap();

        assert_eq!(
            report.expired.map(|summary| summary.affected_rounds),
            Some(vec![harness.round_id])
        );
        assert_eq!(report.recovered, None);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("recover_stuck_tables"));
    }

    #[tokio::test(start_paused = true)]
    async fn runs_closer_than_min_spacing_are_refused() {
        let harness = Harness::host(AppConfig::default()).await;

        run_manual(&harness.state).await.unwrap();
        let err = run_manual(&harness.state).await.unwrap_err();
        assert!(matches!(err, ServiceError::RateLimited(_)));

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(run_manual(&harness.state).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn both_failing_is_an_error_and_still_broadcast() {
        let harness = Harness::host(AppConfig::default()).await;
        harness.store.set_failing(MemoryOperation::ExpireRounds, true);
        harness.store.set_failing(MemoryOperation::RecoverStuckTables, true);
        let mut events = harness.state.sse().subscribe();

        let err = run_manual(&harness.state).await.unwrap_err();

        assert!(matches!(err, ServiceError::Unavailable(_)));
        let event = events.try_recv().unwrap();
        assert_eq!(event.event.as_deref(), Some("cleanup"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_manual_run_does_not_block_later_runs() {
        let harness = Harness::host(AppConfig::default()).await;
        harness
            .store
            .set_delay(MemoryOperation::ExpireRounds, Duration::from_secs(2));

        let state = harness.state.clone();
        let request = tokio::spawn(async move { run_manual(&state).await });
        tokio::time::sleep(Duration::from_millis(500)).await;
        request.abort();
        assert!(request.await.unwrap_err().is_cancelled());

        harness
            .store
            .set_delay(MemoryOperation::ExpireRounds, Duration::ZERO);
        tokio::time::advance(Duration::from_secs(600)).await;
        assert!(run_manual(&harness.state).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn scheduled_run_waits_for_initial_delay() {
        let harness = Harness::host(AppConfig::default()).await;
        harness.force_phase(PhaseEntity::Vote).await;
        harness.clock.advance(Duration::from_secs(60));

        let task = tokio::spawn(run(harness.state.clone()));
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(harness.store.rounds_of(harness.table_id).await[0].phase, PhaseEntity::Vote);

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(harness.store.rounds_of(harness.table_id).await[0].phase, PhaseEntity::Result);
        task.abort();
    }
}
