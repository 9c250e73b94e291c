use axum::{Json, Router, extract::State, http::StatusCode, routing::{get, post}};
use axum_valid::Valid;

use crate::{
    dto::{
        requests::{AdvanceRoundRequest, CastVoteRequest, SubmitSuggestionRequest, TieBreakRequest},
        round::{
            ActionResponse, AdvanceResponse, RoundStateResponse, SuggestionCreatedResponse,
            VoteResponse,
        },
    },
    error::AppError,
    services::{advance_service, round_service},
    state::SharedState,
};

#[utoipa::path(
    get,
    path = "/round",
    tag = "round",
    responses((status = 200, description = "Current derived round view", body = RoundStateResponse))
)]
/// Return the cached round view with tally, countdown, connection and watchdog state.
pub async fn current_round(State(state): State<SharedState>) -> Json<RoundStateResponse> {
    Json(round_service::current_view(&state).await)
}

#[utoipa::path(
    post,
    path = "/round/suggestions",
    tag = "round",
    request_body = SubmitSuggestionRequest,
    responses(
        (status = 201, description = "Suggestion stored", body = SuggestionCreatedResponse),
        (status = 400, description = "Invalid suggestion text"),
        (status = 409, description = "Round is not in the suggest phase"),
        (status = 503, description = "Store unavailable")
    )
)]
/// Submit a suggestion for the current round.
pub async fn submit_suggestion(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<SubmitSuggestionRequest>>,
) -> Result<(StatusCode, Json<SuggestionCreatedResponse>), AppError> {
    let created = round_service::submit_suggestion(&state, &payload.text).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    post,
    path = "/round/votes",
    tag = "round",
    request_body = CastVoteRequest,
    responses(
        (status = 200, description = "Vote recorded or already present", body = VoteResponse),
        (status = 400, description = "Suggestion is not part of the round"),
        (status = 409, description = "Round is not in the vote phase")
    )
)]
/// Cast this participant's vote.
pub async fn cast_vote(
    State(state): State<SharedState>,
    Json(payload): Json<CastVoteRequest>,
) -> Result<Json<VoteResponse>, AppError> {
    let status = round_service::cast_vote(&state, payload.suggestion_id).await?;
    Ok(Json(VoteResponse { status }))
}

#[utoipa::path(
    post,
    path = "/round/advance",
    tag = "host",
    request_body = AdvanceRoundRequest,
    responses(
        (status = 200, description = "Advance performed or already done by another client", body = AdvanceResponse),
        (status = 403, description = "Requester is not the table host"),
        (status = 409, description = "Transition not allowed or already in flight")
    )
)]
/// Manually advance the round (host only).
pub async fn advance_round(
    State(state): State<SharedState>,
    Json(payload): Json<AdvanceRoundRequest>,
) -> Result<Json<AdvanceResponse>, AppError> {
    let response = advance_service::manual_advance(&state, payload.action.into()).await?;
    Ok(Json(response))
}

#[utoipa::path(
    post,
    path = "/round/tie-break",
    tag = "host",
    request_body = TieBreakRequest,
    responses(
        (status = 200, description = "Winner recorded and next round opened", body = AdvanceResponse),
        (status = 400, description = "Pick is not one of the tied winners"),
        (status = 403, description = "Requester is not the table host"),
        (status = 409, description = "Round is not a tied result")
    )
)]
/// Resolve a tied result by picking the winner (host only).
pub async fn tie_break(
    State(state): State<SharedState>,
    Json(payload): Json<TieBreakRequest>,
) -> Result<Json<AdvanceResponse>, AppError> {
    let response = advance_service::tie_break(&state, payload.winner_id).await?;
    Ok(Json(response))
}

#[utoipa::path(
    post,
    path = "/round/auto-advance/cancel",
    tag = "round",
    responses((status = 200, description = "Running auto-advance countdown cancelled", body = ActionResponse))
)]
/// Cancel the auto-advance countdown of the current result.
pub async fn cancel_auto_advance(State(state): State<SharedState>) -> Json<ActionResponse> {
    advance_service::cancel_auto_advance(&state);
    Json(ActionResponse::new("auto-advance cancelled"))
}

#[utoipa::path(
    post,
    path = "/round/refresh",
    tag = "round",
    responses(
        (status = 200, description = "Fresh round view", body = RoundStateResponse),
        (status = 503, description = "Store unavailable")
    )
)]
/// Panic refresh: fetch the table right away and return the new view.
pub async fn refresh_round(
    State(state): State<SharedState>,
) -> Result<Json<RoundStateResponse>, AppError> {
    round_service::refresh(&state).await?;
    Ok(Json(round_service::current_view(&state).await))
}

/// Configure the round routes.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/round", get(current_round))
        .route("/round/suggestions", post(submit_suggestion))
        .route("/round/votes", post(cast_vote))
        .route("/round/advance", post(advance_round))
        .route("/round/tie-break", post(tie_break))
        .route("/round/auto-advance/cancel", post(cancel_auto_advance))
        .route("/round/refresh", post(refresh_round))
}
