//! Router and request handlers for the elimination endpoints.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tally_core::service::VoteInput;
use tally_model::{
    Dashboard, ParticipantId, ParticipantStanding, Round, RoundId, RoundWithParticipants, UserId,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::errors::{AppError, AppResult};
use crate::state::AppState;

/// Header carrying the already-verified voter identity, set by the upstream
/// auth layer.
pub const USER_ID_HEADER: &str = "x-user-id";

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/v1/eliminations",
            post(handle_create_round).get(handle_all_rounds),
        )
        .route("/api/v1/eliminations/open", get(handle_open_rounds))
        .route("/api/v1/eliminations/dashboard", get(handle_dashboard))
        .route("/api/v1/eliminations/{id}/vote", post(handle_vote))
        .route("/api/v1/eliminations/{id}/result", get(handle_result))
        .route("/api/v1/eliminations/{id}/finish", patch(handle_finish))
        .route("/metrics", get(handle_metrics))
        .route("/healthz", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct CreateRoundBody {
    pub participants: Vec<ParticipantId>,
}

#[derive(Debug, Deserialize)]
pub struct VoteBody {
    pub participant_id: ParticipantId,
}

#[derive(Debug, Serialize)]
struct SuccessResponse {
    success: bool,
}

/// Extracts the verified caller identity. Token verification happens
/// upstream; a missing or malformed header means the request never passed
/// through the auth layer.
fn caller_identity(headers: &HeaderMap) -> Result<UserId, AppError> {
    let value = headers
        .get(USER_ID_HEADER)
        .ok_or_else(|| AppError::unauthorized("missing caller identity"))?;
    value
        .to_str()
        .ok()
        .and_then(|raw| raw.parse::<UserId>().ok())
        .ok_or_else(|| AppError::unauthorized("invalid caller identity"))
}

async fn handle_create_round(
    State(state): State<AppState>,
    Json(body): Json<CreateRoundBody>,
) -> AppResult<(StatusCode, Json<Round>)> {
    let round = state.service.create_round(&body.participants).await?;
    Ok((StatusCode::CREATED, Json(round)))
}

async fn handle_vote(
    State(state): State<AppState>,
    Path(round_id): Path<RoundId>,
    headers: HeaderMap,
    Json(body): Json<VoteBody>,
) -> AppResult<(StatusCode, Json<SuccessResponse>)> {
    let user_id = caller_identity(&headers)?;
    state
        .service
        .vote(VoteInput {
            round_id,
            user_id,
            participant_id: body.participant_id,
        })
        .await?;

    // Accepted by the transport; persistence happens asynchronously.
    Ok((StatusCode::CREATED, Json(SuccessResponse { success: true })))
}

async fn handle_result(
    State(state): State<AppState>,
    Path(round_id): Path<RoundId>,
) -> AppResult<Json<Vec<ParticipantStanding>>> {
    Ok(Json(state.service.result(round_id).await?))
}

async fn handle_finish(
    State(state): State<AppState>,
    Path(round_id): Path<RoundId>,
) -> AppResult<Json<SuccessResponse>> {
    state.service.finish_round(round_id).await?;
    Ok(Json(SuccessResponse { success: true }))
}

async fn handle_dashboard(State(state): State<AppState>) -> AppResult<Json<Dashboard>> {
    Ok(Json(state.service.dashboard().await?))
}

async fn handle_all_rounds(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<RoundWithParticipants>>> {
    Ok(Json(state.service.all_rounds().await?))
}

async fn handle_open_rounds(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<RoundWithParticipants>>> {
    Ok(Json(state.service.open_rounds().await?))
}

async fn handle_metrics(State(state): State<AppState>) -> Json<tally_core::metrics::MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

async fn handle_health() -> StatusCode {
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{HeaderValue, Request};
    use serde_json::json;
    use tally_core::publish::VotePublisher;
    use tally_core::queue::memory::InMemoryTransport;
    use tally_core::store::memory::InMemoryStore;
    use tally_core::{RoundService, VotingMetrics};
    use tower::ServiceExt;

    fn setup_state() -> (Arc<InMemoryStore>, AppState) {
        let store = Arc::new(InMemoryStore::new());
        let transport = Arc::new(InMemoryTransport::new());
        let metrics = Arc::new(VotingMetrics::new());
        let publisher = VotePublisher::new(transport, metrics.clone());
        let service = Arc::new(RoundService::new(store.clone(), store.clone(), publisher));
        (store, AppState { service, metrics })
    }

    fn json_request(method: &str, uri: String, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn create_round_responds_created_with_the_round_body() {
        let (store, state) = setup_state();
        let participant = ParticipantId::new();
        store.seed_participant(participant, "A");

        let request = json_request(
            "POST",
            "/api/v1/eliminations".to_string(),
            json!({ "participants": [participant] }),
        );
        let response = router(state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let round: Round = serde_json::from_slice(&body).unwrap();
        assert!(round.open);
    }

    #[tokio::test]
    async fn vote_route_requires_identity_then_accepts() {
        let (store, state) = setup_state();
        let participant = ParticipantId::new();
        store.seed_participant(participant, "A");
        let round = state.service.create_round(&[participant]).await.unwrap();
        let app = router(state);

        let uri = format!("/api/v1/eliminations/{}/vote", round.id);
        let body = json!({ "participant_id": participant });

        let anonymous = json_request("POST", uri.clone(), body.clone());
        let response = app.clone().oneshot(anonymous).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let mut authed = json_request("POST", uri, body);
        authed.headers_mut().insert(
            USER_ID_HEADER,
            HeaderValue::from_str(&UserId::new().to_string()).unwrap(),
        );
        let response = app.oneshot(authed).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["success"], json!(true));
    }

    #[tokio::test]
    async fn dashboard_route_maps_no_open_round_to_not_found() {
        let (_store, state) = setup_state();

        let request = Request::builder()
            .uri("/api/v1/eliminations/dashboard")
            .body(Body::empty())
            .unwrap();
        let response = router(state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["error"]["status"], json!(404));
    }

    #[test]
    fn caller_identity_requires_the_header() {
        let headers = HeaderMap::new();
        let error = caller_identity(&headers).unwrap_err();
        assert_eq!(error.status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn caller_identity_rejects_garbage() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_static("not-a-uuid"));
        let error = caller_identity(&headers).unwrap_err();
        assert_eq!(error.status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn caller_identity_parses_a_uuid() {
        let user = UserId::new();
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_ID_HEADER,
            HeaderValue::from_str(&user.to_string()).unwrap(),
        );
        assert_eq!(caller_identity(&headers).unwrap(), user);
    }
}
