//! Layer catalogue handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use chronoscope_common::{
    auth::Caller,
    db::models::Layer,
    db::store::{LayerPatch, NewLayer},
    errors::{AppError, Result},
};

/// Request to create a layer
#[derive(Debug, Deserialize, Validate)]
pub struct CreateLayerRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,

    pub description: Option<String>,

    pub year_from: i32,

    pub year_to: i32,

    /// Raw lexicon: words separated by comma, space or semicolon
    #[serde(default)]
    pub words: String,
}

/// Partial layer update
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateLayerRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    pub description: Option<String>,
    pub year_from: Option<i32>,
    pub year_to: Option<i32>,
    pub words: Option<String>,
}

/// Layer as returned by the API
#[derive(Debug, Serialize, Deserialize)]
pub struct LayerResponse {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub year_from: i32,
    pub year_to: i32,
    pub status: String,
    pub words: String,
    /// Parsed lexicon, sorted
    pub lexicon: Vec<String>,
}

impl From<Layer> for LayerResponse {
    fn from(layer: Layer) -> Self {
        let mut lexicon: Vec<String> = layer.lexicon().into_iter().collect();
        lexicon.sort();

        Self {
            id: layer.id,
            name: layer.name,
            description: layer.description,
            year_from: layer.year_from,
            year_to: layer.year_to,
            status: layer.status,
            words: layer.words,
            lexicon,
        }
    }
}

fn check_year_range(year_from: i32, year_to: i32) -> Result<()> {
    if year_from > year_to {
        return Err(AppError::Validation {
            message: format!("year_from {} is after year_to {}", year_from, year_to),
            field: Some("year_from".to_string()),
        });
    }
    Ok(())
}

/// List active layers
pub async fn list_layers(State(state): State<AppState>) -> Result<Json<Vec<LayerResponse>>> {
    let layers = state.store.active_layers().await?;
    Ok(Json(layers.into_iter().map(LayerResponse::from).collect()))
}

/// Get a single active layer
pub async fn get_layer(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<LayerResponse>> {
    let layer = state
        .store
        .find_active_layer(id)
        .await?
        .ok_or(AppError::LayerNotFound { id })?;

    Ok(Json(layer.into()))
}

/// Create a layer (moderators only)
pub async fn create_layer(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<CreateLayerRequest>,
) -> Result<(StatusCode, Json<LayerResponse>)> {
    caller.require_moderator()?;
    request.validate()?;
    check_year_range(request.year_from, request.year_to)?;

    let layer = state
        .store
        .create_layer(NewLayer {
            name: request.name,
            description: request.description,
            year_from: request.year_from,
            year_to: request.year_to,
            words: request.words,
        })
        .await?;

    tracing::info!(layer_id = layer.id, moderator_id = caller.user_id, "Layer created");
    Ok((StatusCode::CREATED, Json(layer.into())))
}

/// Update an active layer (moderators only)
pub async fn update_layer(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i64>,
    Json(request): Json<UpdateLayerRequest>,
) -> Result<Json<LayerResponse>> {
    caller.require_moderator()?;
    request.validate()?;

    let existing = state
        .store
        .find_active_layer(id)
        .await?
        .ok_or(AppError::LayerNotFound { id })?;
    check_year_range(
        request.year_from.unwrap_or(existing.year_from),
        request.year_to.unwrap_or(existing.year_to),
    )?;

    let patch = LayerPatch {
        name: request.name,
        description: request.description,
        year_from: request.year_from,
        year_to: request.year_to,
        words: request.words,
    };

    let layer = state
        .store
        .update_layer(id, patch)
        .await?
        .ok_or(AppError::LayerNotFound { id })?;

    Ok(Json(layer.into()))
}

/// Soft-delete a layer (moderators only)
pub async fn delete_layer(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    caller.require_moderator()?;

    if !state.store.delete_layer(id).await? {
        return Err(AppError::LayerNotFound { id });
    }

    tracing::info!(layer_id = id, moderator_id = caller.user_id, "Layer deleted");
    Ok(StatusCode::NO_CONTENT)
}
