use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::server::handlers::{chat, health, home};
use crate::state::AppState;

/// Creates the application router with all routes and middleware.
///
/// Routes:
/// - `GET /` chat page
/// - `POST /chat` one question, one answer
/// - `GET /health` readiness report
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(home::home))
        .route("/chat", post(chat::chat))
        .route("/health", get(health::health))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
