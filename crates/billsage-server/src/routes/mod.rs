//! HTTP route handlers.

pub mod analysis;
pub mod bills;
pub mod classify;
pub mod llm;
pub mod progress;
pub mod stats;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::{Json, Router};
use billsage_core::Error;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the main Axum router with all routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(stats::routes())
        .merge(bills::routes())
        .merge(progress::routes())
        .merge(analysis::routes())
        .merge(classify::routes())
        .merge(llm::routes())
}

/// Map a core error onto a status code and `{ "error": ... }` body.
pub(crate) fn error_response(e: &Error) -> (StatusCode, Json<serde_json::Value>) {
    let status = match e {
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::Parse(_) | Error::Json(_) => StatusCode::BAD_REQUEST,
        Error::ExternalCall(_) => StatusCode::BAD_GATEWAY,
        Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(serde_json::json!({ "error": e.to_string() })))
}

pub(crate) fn not_found(what: &str) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": format!("{} not found", what) })),
    )
}
