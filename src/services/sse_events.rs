use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::{
    dto::{
        round::{
            CleanupResponse, ConnectionSnapshot, CountdownSnapshot, RoundSnapshotPayload,
            WatchdogSnapshot,
        },
        sse::{
            AdvanceFailedEvent, AdvanceTrigger, AdvisoryEvent, AdvisoryKind, AutoAdvanceEvent,
            AutoAdvanceStatus, CleanupEvent, ConnectionEvent, CountdownEvent, ServerEvent,
            SystemStatus, WatchdogEvent,
        },
    },
    state::{
        SharedState,
        clock_sync::CountdownReading,
        connection::ConnectionSample,
        round::RoundSnapshot,
        state_machine::RoundEvent,
        watchdog::WatchdogState,
    },
};

pub(crate) const EVENT_HANDSHAKE: &str = "handshake";
pub(crate) const EVENT_ROUND_SNAPSHOT: &str = "round.snapshot";
const EVENT_SYSTEM_STATUS: &str = "system_status";
const EVENT_COUNTDOWN: &str = "countdown";
const EVENT_CONNECTION: &str = "connection";
const EVENT_WATCHDOG: &str = "watchdog";
const EVENT_ADVISORY: &str = "advisory";
const EVENT_AUTO_ADVANCE: &str = "auto_advance";
const EVENT_ADVANCE_FAILED: &str = "advance.failed";
const EVENT_CLEANUP: &str = "cleanup";

/// Broadcast a freshly fetched round snapshot with its tally.
pub fn broadcast_round_snapshot(state: &SharedState, snapshot: &RoundSnapshot) {
    let payload = RoundSnapshotPayload::new(snapshot, state.config().auto_advance_default);
    send_event(state, EVENT_ROUND_SNAPSHOT, &payload);
}

/// Broadcast a degraded mode transition.
pub fn broadcast_system_status(state: &SharedState, degraded: bool) {
    send_event(state, EVENT_SYSTEM_STATUS, &SystemStatus { degraded });
}

/// Broadcast a new countdown display value.
pub fn broadcast_countdown(state: &SharedState, reading: CountdownReading) {
    let payload = CountdownEvent(CountdownSnapshot::from(reading));
    send_event(state, EVENT_COUNTDOWN, &payload);
}

/// Broadcast the latest connection sample.
pub fn broadcast_connection(state: &SharedState, sample: &ConnectionSample) {
    let payload = ConnectionEvent(ConnectionSnapshot::from(sample));
    send_event(state, EVENT_CONNECTION, &payload);
}

/// Broadcast the watchdog flags.
pub fn broadcast_watchdog(state: &SharedState, watchdog: WatchdogState) {
    let payload = WatchdogEvent(WatchdogSnapshot::from(watchdog));
    send_event(state, EVENT_WATCHDOG, &payload);
}

/// Broadcast an advisory for the UI to surface.
pub fn broadcast_advisory(
    state: &SharedState,
    kind: AdvisoryKind,
    message: impl Into<String>,
    persistent: bool,
) {
    let payload = AdvisoryEvent {
        kind,
        message: message.into(),
        persistent,
    };
    send_event(state, EVENT_ADVISORY, &payload);
}

/// Broadcast auto-advance countdown progress.
pub fn broadcast_auto_advance(
    state: &SharedState,
    round_id: Uuid,
    status: AutoAdvanceStatus,
    remaining_secs: u64,
) {
    let payload = AutoAdvanceEvent {
        round_id,
        status,
        remaining_secs,
    };
    send_event(state, EVENT_AUTO_ADVANCE, &payload);
}

/// Broadcast a failed advance request.
pub fn broadcast_advance_failed(
    state: &SharedState,
    event: RoundEvent,
    trigger: AdvanceTrigger,
    message: impl Into<String>,
    recoverable: bool,
) {
    let payload = AdvanceFailedEvent {
        event: event.as_str().to_string(),
        trigger,
        message: message.into(),
        recoverable,
    };
    send_event(state, EVENT_ADVANCE_FAILED, &payload);
}

/// Broadcast the result of a manual cleanup run.
pub fn broadcast_cleanup(state: &SharedState, trigger: &str, report: &CleanupResponse) {
    let payload = CleanupEvent {
        trigger: trigger.to_string(),
        report: report.clone(),
    };
    send_event(state, EVENT_CLEANUP, &payload);
}

fn send_event(state: &SharedState, event: &str, payload: &impl Serialize) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(event) => state.sse().broadcast(event),
        Err(err) => warn!(event, error = %err, "failed to serialize SSE payload"),
    }
}
