use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::bootstrap::Readiness;
use crate::errors::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = payload.message.as_deref().map(str::trim).unwrap_or("");
    if message.is_empty() {
        tracing::warn!("Empty message received");
        return Err(ApiError::BadRequest("No message provided".to_string()));
    }

    let preview: String = message.chars().take(50).collect();
    tracing::info!("Processing chat request: '{}'", preview);

    // A request that finds the controller idle kicks the build off.
    let chain = match state.chatbot.ensure_started().await {
        Readiness::Ready(chain) => chain,
        Readiness::Starting => return Err(ApiError::NotReady),
        Readiness::Failed(_) => return Err(ApiError::StartupFailed),
    };

    let answer = chain
        .answer(payload.session_id.as_deref(), message)
        .await
        .map_err(ApiError::internal)?;

    Ok(Json(json!({ "response": answer })))
}
