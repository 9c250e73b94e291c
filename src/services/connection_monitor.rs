use tokio::time::{Instant, MissedTickBehavior, interval, timeout};
use tracing::{debug, info, warn};

use crate::{
    dto::sse::AdvisoryKind,
    services::sse_events,
    state::{
        SharedState,
        connection::{ConnectionAdvisory, ConnectionMonitor, ConnectionSample},
    },
};

/// Probe the store on a fixed interval, and right away when the device reports a network
/// change. Failures never escape: they become `disconnected` samples.
pub async fn run(state: SharedState) {
    let mut monitor = ConnectionMonitor::new();
    let mut ticker = interval(state.config().probe_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = state.network_signal().notified() => {
                debug!(online = state.device_online(), "network change reported; probing now");
                ticker.reset();
            }
        }
        probe_once(&state, &mut monitor).await;
    }
}

/// Measure one sample, publish it and raise the advisory its quality edge calls for.
pub async fn probe_once(state: &SharedState, monitor: &mut ConnectionMonitor) -> ConnectionSample {
    let sample = measure(state).await;

    if let Some(advisory) = monitor.record(&sample) {
        match advisory {
            ConnectionAdvisory::Lost => warn!(warnings = ?sample.warnings, "connection lost"),
            ConnectionAdvisory::Degraded => {
                info!(latency_ms = ?sample.latency_ms, "connection quality degraded")
            }
        }
        sse_events::broadcast_advisory(state, AdvisoryKind::Connection, advisory.message(), false);
    }

    state.publish_connection(sample.clone());
    sse_events::broadcast_connection(state, &sample);
    sample
}

async fn measure(state: &SharedState) -> ConnectionSample {
    if !state.device_online() {
        return ConnectionSample::disconnected("device is offline", state.now());
    }
    let Some(store) = state.round_store().await else {
        return ConnectionSample::disconnected("store not connected", state.now());
    };

    let started = Instant::now();
    match timeout(state.config().probe_timeout, store.probe()).await {
        Ok(Ok(probe)) => ConnectionSample::measured(started.elapsed(), probe.server_time, state.now()),
        Ok(Err(err)) => {
            debug!(error = %err, "connection probe failed");
            ConnectionSample::disconnected(format!("probe failed: {err}"), state.now())
        }
        Err(_) => ConnectionSample::disconnected("probe timed out", state.now()),
    }
}
