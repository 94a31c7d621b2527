//! Research request handlers: draft cart, transitions, listing and the
//! async result callback

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use chronoscope_common::{
    auth::Caller,
    db::models::{RequestStatus, ResearchRequest},
    db::store::{DraftPatch, ResultPatch},
    errors::{AppError, Result},
    ingestion::IngestionReceipt,
    lifecycle::{CartSummary, RequestDetail, TransitionResult},
};

/// Query parameters for listing requests
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub status: Option<String>,
}

/// Draft edit; absent fields are left untouched
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateDraftRequest {
    #[validate(length(max = 100000))]
    pub text_for_analysis: Option<String>,

    #[validate(length(max = 1000))]
    pub purpose: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct CommentRequest {
    #[validate(length(max = 2000))]
    pub comment: Option<String>,
}

/// Result posted back by the computation service; field checks run only
/// after the token has been verified
#[derive(Debug, Deserialize)]
pub struct AsyncResultRequest {
    pub research_request_id: i64,

    pub result_from_year: Option<i32>,

    pub result_to_year: Option<i32>,

    pub matched_layers: Option<i32>,

    pub auth_token: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
}

/// GET /chrono - submitted requests, newest first
pub async fn list_requests(
    State(state): State<AppState>,
    caller: Caller,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<ResearchRequest>>> {
    let status = match params.status.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(RequestStatus::parse(raw).ok_or_else(|| AppError::Validation {
            message: format!("Unknown status '{}'", raw),
            field: Some("status".to_string()),
        })?),
    };

    let requests = state.lifecycle.list_requests(caller, status).await?;
    Ok(Json(requests))
}

/// GET /chrono/cart - the caller's draft and its layer count
pub async fn cart(State(state): State<AppState>, caller: Caller) -> Result<Json<CartSummary>> {
    Ok(Json(state.lifecycle.cart(caller).await?))
}

/// POST /chrono/draft/layers/{layer_id}
pub async fn add_layer_to_draft(
    State(state): State<AppState>,
    caller: Caller,
    Path(layer_id): Path<i64>,
) -> Result<Json<CartSummary>> {
    Ok(Json(state.lifecycle.add_layer_to_draft(caller, layer_id).await?))
}

/// GET /chrono/{id}
pub async fn get_request(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i64>,
) -> Result<Json<RequestDetail>> {
    Ok(Json(state.lifecycle.request_detail(caller, id).await?))
}

/// PUT /chrono/{id}
pub async fn update_draft(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i64>,
    Json(request): Json<UpdateDraftRequest>,
) -> Result<Json<ResearchRequest>> {
    request.validate()?;

    let patch = DraftPatch {
        text_for_analysis: request.text_for_analysis,
        purpose: request.purpose,
    };
    Ok(Json(state.lifecycle.update_draft(caller, id, patch).await?))
}

/// DELETE /chrono/{id}
pub async fn delete_request(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i64>,
) -> Result<Json<TransitionResult>> {
    Ok(Json(state.lifecycle.delete_request(caller, id).await?))
}

/// PUT /chrono/{id}/form
pub async fn form_request(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i64>,
) -> Result<Json<TransitionResult>> {
    Ok(Json(state.lifecycle.form_request(caller, id).await?))
}

/// PUT /chrono/{id}/complete
pub async fn complete_request(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i64>,
) -> Result<Json<TransitionResult>> {
    Ok(Json(state.lifecycle.complete_request(caller, id).await?))
}

/// DELETE /chrono/{id}/layers/{layer_id}
pub async fn remove_layer(
    State(state): State<AppState>,
    caller: Caller,
    Path((id, layer_id)): Path<(i64, i64)>,
) -> Result<Json<StatusResponse>> {
    state.lifecycle.remove_layer(caller, id, layer_id).await?;
    Ok(Json(StatusResponse {
        status: "removed".to_string(),
    }))
}

/// PUT /chrono/{id}/layers/{layer_id}
pub async fn comment_layer(
    State(state): State<AppState>,
    caller: Caller,
    Path((id, layer_id)): Path<(i64, i64)>,
    Json(request): Json<CommentRequest>,
) -> Result<Json<StatusResponse>> {
    request.validate()?;

    state
        .lifecycle
        .comment_layer(caller, id, layer_id, request.comment)
        .await?;
    Ok(Json(StatusResponse {
        status: "updated".to_string(),
    }))
}

/// POST /chrono/async-result - no bearer auth, the shared secret is in the body
pub async fn async_result(
    State(state): State<AppState>,
    payload: std::result::Result<Json<AsyncResultRequest>, JsonRejection>,
) -> Result<Json<IngestionReceipt>> {
    let Json(request) = payload.map_err(|e| AppError::InvalidFormat {
        message: e.body_text(),
    })?;

    let patch = ResultPatch {
        year_from: request.result_from_year,
        year_to: request.result_to_year,
        matched_layers: request.matched_layers,
    };

    let receipt = state
        .ingestion
        .apply_result(request.research_request_id, patch, &request.auth_token)
        .await?;
    Ok(Json(receipt))
}
