use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};

use crate::{
    dto::{
        round::RoundSnapshotPayload,
        sse::{Handshake, ServerEvent},
    },
    services::sse_events::{EVENT_HANDSHAKE, EVENT_ROUND_SNAPSHOT},
    state::SharedState,
};

/// Subscribe to the agent event stream.
pub fn subscribe(state: &SharedState) -> broadcast::Receiver<ServerEvent> {
    state.sse().subscribe()
}

/// Events replayed to a client right after it subscribes: the handshake and the cached
/// snapshot, so a UI never waits for the next refresh to render.
pub async fn initial_events(state: &SharedState) -> Vec<ServerEvent> {
    let identity = state.identity();
    let mut events = Vec::with_capacity(2);

    let handshake = Handshake {
        stream: "events".into(),
        message: "subscribed to round events".into(),
        degraded: state.is_degraded().await,
        participant_id: identity.participant_id,
        table_id: identity.table_id,
    };
    if let Ok(event) = ServerEvent::json(Some(EVENT_HANDSHAKE.to_string()), &handshake) {
        events.push(event);
    }

    if let Some(snapshot) = state.snapshot() {
        let payload = RoundSnapshotPayload::new(&snapshot, state.config().auto_advance_default);
        if let Ok(event) = ServerEvent::json(Some(EVENT_ROUND_SNAPSHOT.to_string()), &payload) {
            events.push(event);
        }
    }

    events
}

fn to_event(payload: ServerEvent) -> Event {
    let mut event = Event::default().data(payload.data);
    if let Some(name) = payload.event {
        event = event.event(name);
    }
    event
}

/// Convert a broadcast receiver into an SSE response, sending `initial` first and then
/// forwarding events until the client disconnects.
pub fn to_sse_stream(
    mut receiver: broadcast::Receiver<ServerEvent>,
    initial: Vec<ServerEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        for payload in initial {
            if tx.send(Ok(to_event(payload))).await.is_err() {
                return;
            }
        }

        loop {
            tokio::select! {
                _ = tx.closed() => break,
                recv_result = receiver.recv() => {
                    match recv_result {
                        Ok(payload) => {
                            if tx.send(Ok(to_event(payload))).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(skipped)) => {
                            debug!(skipped, "SSE subscriber lagged; skipping events");
                            continue;
                        }
                    }
                }
            }
        }

        info!("SSE stream disconnected");
    });

    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
