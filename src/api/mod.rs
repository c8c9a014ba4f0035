use axum::{
    routing::{get, post},
    Router,
};

use crate::server::AppState;

pub mod handlers;
pub mod types;

pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/generate-content", post(handlers::generate_content))
        .route("/chat", post(handlers::chat))
        .route("/health", get(handlers::health))
}
