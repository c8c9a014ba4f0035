use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
};
use tracing::error;

use crate::{api, config::AppConfig, error::ApiError, provider::GeminiClient};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    client: Option<GeminiClient>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Result<Self> {
        let client = GeminiClient::from_config(&config)?;
        Ok(Self {
            config: Arc::new(config),
            client,
        })
    }

    /// The upstream client, or a configuration error when no key was set.
    pub fn client(&self) -> Result<&GeminiClient, ApiError> {
        self.client.as_ref().ok_or_else(|| {
            error!("GEMINI_API_KEY is not configured; refusing upstream call");
            ApiError::Configuration
        })
    }
}

pub fn build_router(state: AppState) -> Router {
    let static_files = ServeDir::new(&state.config.static_dir);

    Router::new()
        .merge(api::api_router())
        // Anything not matched above is served from the static directory
        .fallback_service(static_files)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}
