use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dto::round::{CleanupResponse, CountdownSnapshot, ConnectionSnapshot, WatchdogSnapshot};

#[derive(Clone, Debug)]
/// Dispatched payload carried across SSE channels.
pub struct ServerEvent {
    pub event: Option<String>,
    pub data: String,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Initial metadata sent to an SSE client when it connects.
pub struct Handshake {
    /// Identifier of the SSE stream.
    pub stream: String,
    /// Human-readable message confirming the subscription.
    pub message: String,
    /// Whether the agent is running without a store connection.
    pub degraded: bool,
    /// Participant the agent acts for.
    pub participant_id: Uuid,
    pub table_id: Uuid,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when the agent enters or leaves degraded mode.
pub struct SystemStatus {
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
/// Source of a user-facing advisory.
pub enum AdvisoryKind {
    Connection,
    ClockDrift,
    Stale,
    Panic,
}

#[derive(Debug, Serialize, ToSchema)]
/// Non-fatal notice the UI should surface to the participant.
pub struct AdvisoryEvent {
    pub kind: AdvisoryKind,
    pub message: String,
    /// Persistent advisories stay visible until the condition clears.
    pub persistent: bool,
}

#[derive(Debug, Serialize, ToSchema, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AutoAdvanceStatus {
    Running,
    Cancelled,
    Fired,
}

#[derive(Debug, Serialize, ToSchema)]
/// Progress of the post-result auto-advance countdown.
pub struct AutoAdvanceEvent {
    pub round_id: Uuid,
    pub status: AutoAdvanceStatus,
    pub remaining_secs: u64,
}

#[derive(Debug, Serialize, ToSchema, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
/// What initiated an advance request.
pub enum AdvanceTrigger {
    Host,
    Expiry,
    AutoAdvance,
    TieBreak,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when an advance request fails.
pub struct AdvanceFailedEvent {
    pub event: String,
    pub trigger: AdvanceTrigger,
    pub message: String,
    /// False when retrying cannot succeed without a state change.
    pub recoverable: bool,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
/// Broadcast whenever the countdown display changes.
pub struct CountdownEvent(pub CountdownSnapshot);

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
/// Broadcast after every connection probe.
pub struct ConnectionEvent(pub ConnectionSnapshot);

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
/// Broadcast when the watchdog flags change.
pub struct WatchdogEvent(pub WatchdogSnapshot);

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast after each cleanup run.
pub struct CleanupEvent {
    /// `scheduled` or `manual`.
    pub trigger: String,
    #[serde(flatten)]
    pub report: CleanupResponse,
}
