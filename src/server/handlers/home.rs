use axum::response::{Html, IntoResponse};

/// Serves the bundled single-page chat client.
pub async fn home() -> impl IntoResponse {
    tracing::info!("Home page accessed");
    Html(include_str!("../../../assets/index.html"))
}
