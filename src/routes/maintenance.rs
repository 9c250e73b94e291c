use axum::{Json, Router, extract::State, routing::post};

use crate::{
    dto::{
        requests::NetworkStatusRequest,
        round::{ActionResponse, CleanupResponse},
    },
    error::AppError,
    services::cleanup_service,
    state::SharedState,
};

#[utoipa::path(
    post,
    path = "/maintenance/cleanup",
    tag = "maintenance",
    responses(
        (status = 200, description = "Cleanup summary; a failed operation is listed in `errors`", body = CleanupResponse),
        (status = 429, description = "A cleanup ran too recently or is still running"),
        (status = 503, description = "Both operations failed or the store is unavailable")
    )
)]
/// Expire overdue rounds and recover stuck tables now.
pub async fn run_cleanup(State(state): State<SharedState>) -> Result<Json<CleanupResponse>, AppError> {
    let report = cleanup_service::run_manual(&state).await?;
    Ok(Json(report))
}

#[utoipa::path(
    post,
    path = "/connection/network",
    tag = "maintenance",
    request_body = NetworkStatusRequest,
    responses((status = 200, description = "Network change recorded; a probe follows", body = ActionResponse))
)]
/// Forward an OS-level online/offline change so the connection is re-probed immediately.
pub async fn report_network(
    State(state): State<SharedState>,
    Json(payload): Json<NetworkStatusRequest>,
) -> Json<ActionResponse> {
    state.report_network_change(payload.online);
    let message = if payload.online {
        "device online; probing connection"
    } else {
        "device offline"
    };
    Json(ActionResponse::new(message))
}

/// Configure the maintenance routes.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/maintenance/cleanup", post(run_cleanup))
        .route("/connection/network", post(report_network))
}
