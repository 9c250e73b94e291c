use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report whether a store is installed, along with the last probed connection quality.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let quality = state.connection().quality;
    if state.is_degraded().await {
        warn!("store unavailable (degraded mode)");
        HealthResponse::degraded(quality)
    } else {
        HealthResponse::ok(quality)
    }
}
