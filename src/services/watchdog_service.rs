use tokio::time::{MissedTickBehavior, interval};
use tracing::{info, warn};

use crate::{
    dto::sse::AdvisoryKind,
    services::sse_events,
    state::{
        SharedState,
        round::RoundPhase,
        watchdog::{Watchdog, WatchdogEscalation},
    },
};

const STALE_MESSAGE: &str = "round data looks out of date; refreshing";
const PANIC_MESSAGE: &str =
    "round data has not updated for a long time; try a panic refresh if this persists";

/// Escalate `fresh → stale → panic` while no fresh snapshot arrives during a timed phase.
pub async fn run(state: SharedState) {
    let config = state.config();
    let mut watchdog = Watchdog::new(state.now(), config.stale_after, config.panic_after);
    let mut snapshots = state.snapshot_watcher();
    let mut ticker = interval(config.watchdog_poll);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                evaluate_once(&state, &mut watchdog);
            }
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let was_flagged = {
                    let current = watchdog.state();
                    current.is_stale || current.is_panic
                };
                watchdog.mark_fresh(state.now());
                state.publish_watchdog(watchdog.state());
                if was_flagged {
                    info!("fresh round data received; watchdog cleared");
                    sse_events::broadcast_watchdog(&state, watchdog.state());
                }
            }
        }
    }
}

/// Run one evaluation; escalations force a refresh and raise an advisory.
pub fn evaluate_once(state: &SharedState, watchdog: &mut Watchdog) -> WatchdogEscalation {
    if !state.config().watchdog_enabled {
        return WatchdogEscalation::default();
    }
    let timed = state
        .snapshot()
        .and_then(|snapshot| snapshot.phase())
        .is_some_and(RoundPhase::is_timed);
    if !timed {
        return WatchdogEscalation::default();
    }

    let escalation = watchdog.evaluate(state.now(), state.connection().quality);
    if escalation.is_empty() {
        return escalation;
    }

    let current = watchdog.state();
    state.publish_watchdog(current);
    sse_events::broadcast_watchdog(state, current);

    if escalation.entered_stale {
        info!(last_fresh_at = %current.last_fresh_at, "round data is stale");
        sse_events::broadcast_advisory(state, AdvisoryKind::Stale, STALE_MESSAGE, false);
    }
    if escalation.entered_panic {
        warn!(last_fresh_at = %current.last_fresh_at, "round data still stale; watchdog panicked");
        sse_events::broadcast_advisory(state, AdvisoryKind::Panic, PANIC_MESSAGE, true);
    }
    state.request_refresh();

    escalation
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::models::PhaseEntity,
        services::{round_service, test_support::Harness},
    };

    fn watchdog_for(harness: &Harness) -> Watchdog {
        let config = harness.state.config();
        Watchdog::new(harness.state.now(), config.stale_after, config.panic_after)
    }

    #[tokio::test]
    async fn escalates_only_during_timed_phases() {
        let harness = Harness::host(AppConfig::default()).await;
        round_service::refresh(&harness.state).await.unwrap();
        let mut watchdog = watchdog_for(&harness);

        harness.clock.advance(Duration::from_secs(60));
        assert!(evaluate_once(&harness.state, &mut watchdog).is_empty());

        harness.force_phase(PhaseEntity::Vote).await;
        let escalation = evaluate_once(&harness.state, &mut watchdog);
        assert!(escalation.entered_stale);
        assert!(escalation.entered_panic);
        assert!(harness.state.watchdog().is_panic);
    }

    #[tokio::test]
    async fn disabled_watchdog_never_escalates() {
        let harness = Harness::host(AppConfig {
            watchdog_enabled: false,
            ..AppConfig::default()
        })
        .await;
        harness.force_phase(PhaseEntity::Suggest).await;
        let mut watchdog = watchdog_for(&harness);

        harness.clock.advance(Duration::from_secs(120));
        assert!(evaluate_once(&harness.state, &mut watchdog).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_snapshot_clears_stale_flag() {
        let harness = Harness::host(AppConfig::default()).await;
        harness.force_phase(PhaseEntity::Suggest).await;
        let mut events = harness.state.sse().subscribe();

        let task = tokio::spawn(run(harness.state.clone()));
        tokio::task::yield_now().await;
        harness.clock.advance(Duration::from_secs(21));
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(harness.state.watchdog().is_stale);
        assert!(!harness.state.watchdog().is_panic);

        round_service::refresh(&harness.state).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!harness.state.watchdog().is_stale);

        let advisories = std::iter::from_fn(|| events.try_recv().ok())
            .filter(|event| event.event.as_deref() == Some("advisory"))
            .count();
        assert_eq!(advisories, 1);
        task.abort();
    }
}
