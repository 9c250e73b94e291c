use std::time::Duration;

use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, warn};

use crate::{
    dto::sse::AdvisoryKind,
    services::sse_events,
    state::{
        SharedState,
        clock_sync::{ClockSync, CountdownReading},
        connection::ConnectionSample,
    },
};

const TICK: Duration = Duration::from_secs(1);

/// Recompute the countdown every second, and immediately whenever a new snapshot or
/// connection sample arrives. Probe replies feed the drift estimate.
pub async fn run(state: SharedState) {
    let mut clock = ClockSync::new();
    let mut snapshots = state.snapshot_watcher();
    let mut connection = state.connection_watcher();
    let mut ticker = interval(TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            changed = connection.changed() => {
                if changed.is_err() {
                    break;
                }
                let sample = connection.borrow_and_update().clone();
                observe_sample(&state, &mut clock, &sample);
            }
        }
        tick(&state, &mut clock);
    }
}

/// Update the drift estimate from a probe reply, raising the one-shot advisory when the
/// device clock is too far off to correct.
pub fn observe_sample(state: &SharedState, clock: &mut ClockSync, sample: &ConnectionSample) {
    let (Some(server_time), Some(latency_ms)) = (sample.server_time, sample.latency_ms) else {
        return;
    };
    match clock.observe_server_time(server_time, latency_ms, sample.sampled_at) {
        Some(advisory) => {
            warn!(
                drift_ms = advisory.estimated_drift_ms,
                "device clock differs from server; drift not applied"
            );
            sse_events::broadcast_advisory(state, AdvisoryKind::ClockDrift, advisory.message(), false);
        }
        None => debug!(drift_ms = clock.drift_offset_ms(), "clock drift estimate updated"),
    }
}

/// Compute and publish one countdown reading; it is broadcast only when the display changes.
pub fn tick(state: &SharedState, clock: &mut ClockSync) -> CountdownReading {
    let deadline = state
        .snapshot()
        .and_then(|snapshot| snapshot.round().and_then(|round| round.deadline));
    let sample = state.connection();
    // No push channel delivers a server-side countdown, so there is no fallback value.
    let reading = clock.compute(deadline, None, state.now(), sample.latency_ms, sample.quality);
    if state.publish_countdown(reading) {
        sse_events::broadcast_countdown(state, reading);
    }
    reading
}
