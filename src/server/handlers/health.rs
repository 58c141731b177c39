use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::bootstrap::Phase;
use crate::state::AppState;

/// Readiness report. Always answers, even after a failed startup.
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.chatbot.phase().await {
        Phase::Ready => Json(json!({
            "status": "healthy",
            "chatbot": "ready"
        }))
        .into_response(),
        Phase::Idle | Phase::Starting => Json(json!({
            "status": "initializing",
            "chatbot": "not_ready"
        }))
        .into_response(),
        Phase::Failed(cause) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "status": "unhealthy",
                "error": cause
            })),
        )
            .into_response(),
    }
}
