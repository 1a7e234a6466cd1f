//! Single-service classification, for checking the decision chain by hand.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;

use billsage_core::{BillContext, Service};

use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/classify", post(classify_service))
}

#[derive(Deserialize)]
struct ClassifyBody {
    service: Service,
    #[serde(default)]
    context: BillContext,
}

/// POST /api/classify: run one service through the tier chain.
async fn classify_service(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ClassifyBody>,
) -> Json<serde_json::Value> {
    let engine = state.pipeline.engine();
    let decision = engine.decide(&body.service, &body.context).await;

    Json(serde_json::json!({
        "decision": decision,
        "tiers": engine.tier_names(),
    }))
}
