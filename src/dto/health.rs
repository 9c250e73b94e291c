use serde::Serialize;
use utoipa::ToSchema;

use crate::state::connection::ConnectionQuality;

/// Response of the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// "ok" when a store is installed, "degraded" otherwise.
    pub status: String,
    /// Quality of the last connection probe.
    pub connection: String,
}

impl HealthResponse {
    pub fn ok(quality: ConnectionQuality) -> Self {
        Self {
            status: "ok".to_string(),
            connection: quality.as_str().to_string(),
        }
    }

    pub fn degraded(quality: ConnectionQuality) -> Self {
        Self {
            status: "degraded".to_string(),
            connection: quality.as_str().to_string(),
        }
    }
}
