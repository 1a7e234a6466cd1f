//! LLM provider configuration routes.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use billsage_chat::providers;
use billsage_chat::{LLMConfigUpdate, LLMProvider, TestKeyRequest};
use tracing::info;

use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/llm/config", get(get_config).put(update_config))
        .route("/llm/config/test", post(test_key))
}

async fn get_config(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let config = state.llm_config.read();
    Json(serde_json::json!(config.to_response()))
}

/// PUT /api/llm/config: merge and persist. Keys never come back out.
async fn update_config(
    State(state): State<Arc<AppState>>,
    Json(update): Json<LLMConfigUpdate>,
) -> impl IntoResponse {
    if let Some(preferred) = update.preferred_provider.as_deref() {
        if preferred != "auto" && LLMProvider::from_name(preferred).is_none() {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": format!("Unknown provider: {}", preferred) })),
            );
        }
    }

    let mut config = state.llm_config.write();
    config.apply_update(&update);
    if let Err(e) = config.save() {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": format!("Failed to save config: {}", e) })),
        );
    }

    let response = config.to_response();
    info!(
        "LLM config updated; classification provider: {}",
        response
            .active_provider
            .map(|p| p.to_string())
            .unwrap_or_else(|| "none".into())
    );
    (StatusCode::OK, Json(serde_json::json!(response)))
}

/// POST /api/llm/config/test: a failing key still answers 200 with `success: false`.
async fn test_key(Json(req): Json<TestKeyRequest>) -> impl IntoResponse {
    match providers::test_api_key(&req.provider, &req.api_key).await {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({ "success": true }))),
        Err(e) => (
            StatusCode::OK,
            Json(serde_json::json!({ "success": false, "error": e })),
        ),
    }
}
