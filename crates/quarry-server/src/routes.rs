use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use quarry_schema::EventEnvelope;

use crate::state::AppState;

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Slack Events API endpoint. The handshake echoes the challenge; event
/// callbacks are handed to the dispatcher and acknowledged immediately —
/// Slack redelivers anything that is not acked fast.
pub async fn slack_events(
    State(state): State<AppState>,
    Json(envelope): Json<EventEnvelope>,
) -> Response {
    if envelope.is_url_verification() {
        let challenge = envelope.challenge.clone().unwrap_or_default();
        return Json(serde_json::json!({"challenge": challenge})).into_response();
    }

    if envelope.is_event_callback() {
        state.dispatcher.handle(envelope);
        return Json(serde_json::json!({})).into_response();
    }

    tracing::warn!(kind = %envelope.kind, "unsupported payload type");
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({"error": "unsupported payload type"})),
    )
        .into_response()
}
