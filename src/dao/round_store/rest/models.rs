use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::dao::models::{AdvanceEventEntity, AdvanceRequestEntity, PhaseEntity};

pub const TABLES: &str = "tables";
pub const ROUNDS: &str = "rounds";
pub const SUGGESTIONS: &str = "suggestions";
pub const VOTES: &str = "votes";
pub const PARTICIPANTS: &str = "participants";

pub const RPC_ADVANCE_ROUND: &str = "rpc/advance_round";
pub const RPC_EXPIRE_ROUNDS: &str = "rpc/expire_rounds";
pub const RPC_RECOVER_STUCK_TABLES: &str = "rpc/recover_stuck_tables";
pub const RPC_SERVER_TIME: &str = "rpc/server_time";

/// Postgres error code for unique constraint violations.
pub const UNIQUE_VIOLATION: &str = "23505";

/// Arguments of the `advance_round` function, prefixed the way the SQL function names them.
#[derive(Debug, Serialize)]
pub struct AdvanceRoundArgs {
    pub p_table_id: Uuid,
    pub p_round_id: Uuid,
    pub p_from_phase: PhaseEntity,
    pub p_requester_id: Uuid,
    pub p_event: AdvanceEventEntity,
    #[serde(with = "time::serde::rfc3339::option")]
    pub p_deadline: Option<OffsetDateTime>,
    pub p_winner_id: Option<Uuid>,
}

impl From<AdvanceRequestEntity> for AdvanceRoundArgs {
    fn from(value: AdvanceRequestEntity) -> Self {
        Self {
            p_table_id: value.table_id,
            p_round_id: value.round_id,
            p_from_phase: value.from_phase,
            p_requester_id: value.requester_id,
            p_event: value.event,
            p_deadline: value.deadline,
            p_winner_id: value.winner_id,
        }
    }
}

/// Error body returned by the REST layer.
#[derive(Debug, Default, Deserialize)]
pub struct ApiErrorBody {
    pub code: Option<String>,
    pub message: Option<String>,
    pub details: Option<String>,
}

impl ApiErrorBody {
    /// Parse an error body, tolerating empty or non-JSON payloads.
    pub fn parse(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_default()
    }

    /// Human readable message for logs and user feedback.
    pub fn describe(&self, status: StatusCode) -> String {
        match (&self.message, &self.details) {
            (Some(message), Some(details)) => format!("{} ({details})", message.trim()),
            (Some(message), None) => message.trim().to_string(),
            _ => format!("HTTP {}", status.as_u16()),
        }
    }

    /// Whether the body reports a unique constraint violation.
    pub fn is_unique_violation(&self) -> bool {
        self.code.as_deref() == Some(UNIQUE_VIOLATION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_violation_is_detected_from_error_code() {
        let body = ApiErrorBody::parse(
            r#"{"code":"23505","message":"duplicate key value violates unique constraint \"votes_round_voter\"","details":null}"#,
        );
        assert!(body.is_unique_violation());
        assert!(body.describe(StatusCode::CONFLICT).starts_with("duplicate key"));
    }

    #[test]
    fn non_json_body_falls_back_to_status() {
        let body = ApiErrorBody::parse("<html>bad gateway</html>");
        assert!(!body.is_unique_violation());
        assert_eq!(body.describe(StatusCode::BAD_GATEWAY), "HTTP 502");
    }
}
