use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification of the agent's local HTTP surface.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sse::event_stream,
        crate::routes::round::current_round,
        crate::routes::round::submit_suggestion,
        crate::routes::round::cast_vote,
        crate::routes::round::advance_round,
        crate::routes::round::tie_break,
        crate::routes::round::cancel_auto_advance,
        crate::routes::round::refresh_round,
        crate::routes::maintenance::run_cleanup,
        crate::routes::maintenance::report_network,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::phase::VisiblePhase,
            crate::dto::requests::SubmitSuggestionRequest,
            crate::dto::requests::CastVoteRequest,
            crate::dto::requests::AdvanceAction,
            crate::dto::requests::AdvanceRoundRequest,
            crate::dto::requests::TieBreakRequest,
            crate::dto::requests::NetworkStatusRequest,
            crate::dto::round::RoundStateResponse,
            crate::dto::round::RoundSnapshotPayload,
            crate::dto::round::SuggestionCreatedResponse,
            crate::dto::round::VoteResponse,
            crate::dto::round::AdvanceResponse,
            crate::dto::round::ActionResponse,
            crate::dto::round::CleanupResponse,
            crate::dto::sse::Handshake,
            crate::dto::sse::SystemStatus,
            crate::dto::sse::AdvisoryEvent,
            crate::dto::sse::AutoAdvanceEvent,
            crate::dto::sse::AdvanceFailedEvent,
            crate::dto::sse::CleanupEvent,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "round", description = "Round view, suggestions and votes"),
        (name = "host", description = "Host-only round controls"),
        (name = "maintenance", description = "Cleanup and connectivity hooks"),
        (name = "sse", description = "Server-sent events stream"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use utoipa::OpenApi;

    use super::ApiDoc;

    #[test]
    fn document_lists_round_routes() {
        let doc = ApiDoc::openapi();
        for path in ["/round", "/round/tie-break", "/sse/events", "/maintenance/cleanup"] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
