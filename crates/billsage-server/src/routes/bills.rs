//! Bill registration, lookup, analysis and QA routes.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tracing::info;

use billsage_runtime::call_with_policy;
use billsage_store::NewBill;

use super::{error_response, not_found};
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/bills", get(list_bills).post(create_bill))
        .route("/bills/{id}", get(get_bill).delete(delete_bill))
        .route("/bills/{id}/analyze", post(analyze_bill))
        .route("/bills/{id}/qa", post(ask_question))
}

// ---------------------------------------------------------------
// Query / Body types
// ---------------------------------------------------------------

#[derive(Deserialize)]
struct ListQuery {
    #[serde(rename = "userId")]
    user_id: Option<String>,
}

#[derive(Deserialize)]
struct CreateBillBody {
    #[serde(rename = "userId")]
    user_id: String,
    #[serde(rename = "documentUrl")]
    document_url: String,
}

#[derive(Deserialize)]
struct AnalyzeBody {
    #[serde(default)]
    reanalyze: bool,
}

#[derive(Deserialize)]
struct QaBody {
    question: String,
}

// ---------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------

async fn list_bills(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> impl IntoResponse {
    match state.store.list_bills(query.user_id.as_deref()) {
        Ok(bills) => (
            StatusCode::OK,
            Json(serde_json::json!({ "bills": bills, "total": bills.len() })),
        ),
        Err(e) => error_response(&e),
    }
}

/// POST /api/bills: register an uploaded document as a pending bill.
async fn create_bill(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateBillBody>,
) -> impl IntoResponse {
    if body.user_id.trim().is_empty() || body.document_url.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "userId and documentUrl are required" })),
        );
    }

    let new_bill = NewBill {
        user_id: body.user_id,
        document_url: body.document_url,
        ..Default::default()
    };
    match state.store.create_bill(new_bill) {
        Ok(bill) => {
            info!("Registered bill {} for user {}", bill.id, bill.user_id);
            (StatusCode::CREATED, Json(serde_json::json!(bill)))
        }
        Err(e) => error_response(&e),
    }
}

async fn get_bill(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.get_bill(&id) {
        Ok(Some(bill)) => (StatusCode::OK, Json(serde_json::json!(bill))),
        Ok(None) => not_found("Bill"),
        Err(e) => error_response(&e),
    }
}

/// DELETE /api/bills/:id: removes the bill and its progress record.
async fn delete_bill(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.delete_bill(&id) {
        Ok(true) => (StatusCode::OK, Json(serde_json::json!({ "success": true }))),
        Ok(false) => not_found("Bill"),
        Err(e) => error_response(&e),
    }
}

/// POST /api/bills/:id/analyze: queue a pipeline run, answer 202.
async fn analyze_bill(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Option<Json<AnalyzeBody>>,
) -> impl IntoResponse {
    let reanalyze = body.map(|Json(b)| b.reanalyze).unwrap_or(false);

    match state.store.get_bill(&id) {
        Ok(Some(_)) => {}
        Ok(None) => return not_found("Bill"),
        Err(e) => return error_response(&e),
    }

    match state.enqueue_analysis(&id, reanalyze) {
        Some(job) => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({
                "jobId": job.id,
                "billId": job.bill_id,
                "status": job.status,
            })),
        ),
        None => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({ "error": "Analysis already in progress for this bill" })),
        ),
    }
}

/// POST /api/bills/:id/qa: ask a question about an extracted bill.
async fn ask_question(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<QaBody>,
) -> impl IntoResponse {
    let bill = match state.store.get_bill(&id) {
        Ok(Some(bill)) => bill,
        Ok(None) => return not_found("Bill"),
        Err(e) => return error_response(&e),
    };
    let Some(extracted) = bill.extracted else {
        return (
            StatusCode::CONFLICT,
            Json(serde_json::json!({ "error": "Bill has not been extracted yet" })),
        );
    };

    let answer = call_with_policy(&state.config.call_policy, "QA", || {
        state.qa.ask(&body.question, &extracted)
    })
    .await;

    match answer {
        Ok(answer) => (StatusCode::OK, Json(serde_json::json!({ "answer": answer }))),
        Err(e) => error_response(&e),
    }
}
