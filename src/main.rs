use anyhow::Context;
use tokio::net::TcpListener;

use askpaper::config::AppConfig;
use askpaper::logging;
use askpaper::server;
use askpaper::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load configuration")?;
    logging::init(&config);

    tracing::info!("Starting askpaper...");

    let state = AppState::new(config);

    // Kick initialization off now; the listener comes up immediately and
    // reports "initializing" until the pipeline settles.
    state.chatbot.ensure_started().await;

    let bind_addr = state.config.bind_addr();
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    tracing::info!("Listening on {}", listener.local_addr()?);

    let app = server::router::router(state);
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
