use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use crate::{
    api::types::{required, ChatReply, ChatRequest, GeneratedSite, GenerationRequest, HealthResponse},
    error::{ApiError, AttemptError},
    extract::extract_json,
    prompts,
    server::AppState,
};

const EXHAUSTED_MESSAGE: &str =
    "All AI models are currently unavailable. Please try again in a few moments.";
const CHAT_FAILED_MESSAGE: &str = "The assistant could not answer right now. Please try again.";

pub async fn generate_content(
    State(state): State<AppState>,
    payload: Result<Json<GenerationRequest>, JsonRejection>,
) -> Result<Json<GeneratedSite>, ApiError> {
    let Json(req) = payload.map_err(|e| bad_body(&e))?;
    let topic = required(req.topic.as_deref())
        .ok_or_else(|| ApiError::Validation("topic is required".into()))?;

    let request_id = Uuid::new_v4();
    let span = info_span!("generate_content", %request_id);

    async {
        let client = state.client()?;
        info!(topic_len = topic.len(), "generating site");

        let prompt = prompts::site_prompt(topic);
        let site = client
            .generate_with_fallback(&state.config.models, &prompt, |text| {
                extract_json::<GeneratedSite>(text).map_err(AttemptError::from)
            })
            .await
            .map_err(|err| {
                error!(error = %err, "site generation failed");
                ApiError::Unavailable(EXHAUSTED_MESSAGE.into())
            })?;

        Ok::<_, ApiError>(Json(site))
    }
    .instrument(span)
    .await
}

pub async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatReply>, ApiError> {
    let Json(req) = payload.map_err(|e| bad_body(&e))?;
    let message = required(req.message.as_deref())
        .ok_or_else(|| ApiError::Validation("message is required".into()))?;

    let request_id = Uuid::new_v4();
    let span = info_span!("chat", %request_id);

    async {
        let client = state.client()?;

        let prompt = prompts::chat_prompt(message);
        let reply = client
            .generate_with_fallback(&state.config.models, &prompt, |text| {
                Ok(text.trim().to_string())
            })
            .await
            .map_err(|err| {
                error!(error = %err, "chat failed");
                ApiError::Internal(CHAT_FAILED_MESSAGE.into())
            })?;

        Ok::<_, ApiError>(Json(ChatReply { reply }))
    }
    .instrument(span)
    .await
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

fn bad_body(rejection: &JsonRejection) -> ApiError {
    info!(error = %rejection.body_text(), "rejected request body");
    ApiError::Validation("request body must be a JSON object".into())
}
