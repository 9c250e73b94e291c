use tokio::time::{MissedTickBehavior, interval};
use tracing::trace;

use crate::state::{SharedState, round::RoundPhase};

/// Whether a polling refresh is due for the current configuration and phase.
pub fn should_poll(state: &SharedState) -> bool {
    let config = state.config();
    if config.realtime_enabled || !config.polling_enabled {
        return false;
    }
    matches!(
        state.snapshot().and_then(|snapshot| snapshot.phase()),
        Some(RoundPhase::Suggest | RoundPhase::Vote | RoundPhase::Result)
    )
}

/// Light fallback for clients without a push channel: request a refresh on a fixed interval
/// while the round is active. Conditions are re-checked on every tick.
pub async fn run(state: SharedState) {
    let mut ticker = interval(state.config().polling_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        if should_poll(&state) {
            trace!("polling refresh");
            state.request_refresh();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::broadcast;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::models::PhaseEntity,
        dto::sse::ServerEvent,
        services::{round_service, test_support::Harness},
    };

    fn snapshot_events(events: &mut broadcast::Receiver<ServerEvent>) -> usize {
        std::iter::from_fn(|| events.try_recv().ok())
            .filter(|event| event.event.as_deref() == Some("round.snapshot"))
            .count()
    }

    #[tokio::test]
    async fn polls_only_active_rounds_without_realtime() {
        let harness = Harness::host(AppConfig::default()).await;
        assert!(!should_poll(&harness.state));

        round_service::refresh(&harness.state).await.unwrap();
        assert!(!should_poll(&harness.state));

        harness.force_phase(PhaseEntity::Result).await;
        assert!(should_poll(&harness.state));
    }

    #[tokio::test]
    async fn realtime_or_disabled_polling_turns_it_off() {
        for config in [
            AppConfig {
                realtime_enabled: true,
                ..AppConfig::default()
            },
            AppConfig {
                polling_enabled: false,
                ..AppConfig::default()
            },
        ] {
            let harness = Harness::host(config).await;
            harness.force_phase(PhaseEntity::Vote).await;
            assert!(!should_poll(&harness.state));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn run_refreshes_on_the_interval_until_the_round_goes_idle() {
        let harness = Harness::host(AppConfig::default()).await;
        harness.force_phase(PhaseEntity::Vote).await;
        let mut events = harness.state.sse().subscribe();

        let refresher = tokio::spawn(round_service::run_refresher(harness.state.clone()));
        let poller = tokio::spawn(run(harness.state.clone()));

        // Ticks at 0 s, 5 s and 10 s.
        tokio::time::sleep(Duration::from_millis(10_500)).await;
        assert_eq!(snapshot_events(&mut events), 3);

        harness.force_phase(PhaseEntity::Lobby).await;
        snapshot_events(&mut events);
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(snapshot_events(&mut events), 0);

        poller.abort();
        refresher.abort();
    }
}
