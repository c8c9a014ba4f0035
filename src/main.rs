use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use sitegen_proxy::{
    config::AppConfig,
    server::{build_router, AppState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------
    // Config (.env + environment)
    // -----------------------------
    let config = AppConfig::from_env()?;

    // -----------------------------
    // Logging
    // -----------------------------
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    if config.api_key.is_none() {
        warn!("GEMINI_API_KEY is not set; generation requests will fail");
    }
    info!(models = ?config.models, max_attempts = config.max_attempts, "model fallback order");

    let addr = config.bind_addr.clone();
    let static_dir = config.static_dir.clone();
    let state = AppState::new(config)?;
    let app = build_router(state);

    info!("🌐 HTTP listening on http://{addr}");
    info!("🛠 Generate at http://{addr}/generate-content, chat at http://{addr}/chat");
    info!("📁 Serving static files from {static_dir}");

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
