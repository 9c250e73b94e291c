use axum::Router;

use crate::state::SharedState;

pub mod docs;
pub mod health;
pub mod maintenance;
pub mod round;
pub mod sse;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(sse::router())
        .merge(round::router())
        .merge(maintenance::router());

    api_router.merge(docs::router()).with_state(state)
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    use super::*;
    use crate::{config::AppConfig, services::test_support::Harness};

    async fn call(state: SharedState, method: &str, uri: &str, body: &str) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = router(state).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn healthcheck_reports_connected_store() {
        let harness = Harness::host(AppConfig::default()).await;

        let (status, json) = call(harness.state.clone(), "GET", "/healthcheck", "").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        assert_eq!(json["connection"], "excellent");
    }

    #[tokio::test]
    async fn blank_suggestion_is_a_bad_request() {
        let harness = Harness::host(AppConfig::default()).await;

        let (status, _) = call(
            harness.state.clone(),
            "POST",
            "/round/suggestions",
            r#"{"text":"   "}"#,
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn starting_the_round_as_host_advances_it() {
        let harness = Harness::host(AppConfig::default()).await;

        let (status, json) = call(
            harness.state.clone(),
            "POST",
            "/round/advance",
            r#"{"action":"start_round"}"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "advanced");
        assert_eq!(json["round"]["phase"], "suggest");
    }

    #[tokio::test]
    async fn voting_outside_the_vote_phase_conflicts() {
        let harness = Harness::host(AppConfig::default()).await;

        let (status, json) = call(
            harness.state.clone(),
            "POST",
            "/round/votes",
            &format!(r#"{{"suggestion_id":"{}"}}"#, uuid::Uuid::new_v4()),
        )
        .await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert!(json["message"].as_str().unwrap().contains("lobby"));
    }
}
