//! Item CRUD handlers
//!
//! Every mutation emits its broadcast event only after the store write has
//! committed; the event never affects the HTTP outcome.

use super::handlers::{broadcast_payload, record_activity, AppError};
use crate::events::{EntityKind, EventEmitter};
use crate::store::{CreateItem, ItemStatus, UpdateItem};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, Deserialize, Default)]
pub struct ItemsQuery {
    pub owner_id: Option<Uuid>,
    pub status: Option<ItemStatus>,
    pub category: Option<String>,
}

/// `GET /api/items` — list items, newest first, with optional filters
pub async fn list_items(
    State(state): State<AppState>,
    Query(query): Query<ItemsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let items = state
        .store
        .list_items(query.owner_id, query.status, query.category.as_deref())
        .await?;
    Ok(Json(items))
}

/// `GET /api/items/{id}`
pub async fn get_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let item = state
        .store
        .get_item(id)
        .await?
        .ok_or_else(|| AppError::NotFound("item not found".into()))?;
    Ok(Json(item))
}

/// `POST /api/items`
pub async fn create_item(
    State(state): State<AppState>,
    Json(req): Json<CreateItem>,
) -> Result<impl IntoResponse, AppError> {
    if req.name.trim().is_empty() {
        return Err(AppError::BadRequest("item name cannot be empty".into()));
    }

    let item = state.store.create_item(req).await?;

    state
        .event_bus
        .emit_created(EntityKind::Item, broadcast_payload(&item));
    record_activity(
        &state,
        Some(item.owner_id),
        "item_created",
        json!({"item_id": item.id, "name": item.name}),
    )
    .await;

    Ok((StatusCode::CREATED, Json(item)))
}

/// `PATCH /api/items/{id}` — partial update; absent fields keep their value
pub async fn update_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateItem>,
) -> Result<impl IntoResponse, AppError> {
    let item = state
        .store
        .update_item(id, req)
        .await?
        .ok_or_else(|| AppError::NotFound("item not found".into()))?;

    state
        .event_bus
        .emit_updated(EntityKind::Item, broadcast_payload(&item));

    Ok(Json(item))
}

/// `DELETE /api/items/{id}`
pub async fn delete_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let item = state
        .store
        .delete_item(id)
        .await?
        .ok_or_else(|| AppError::NotFound("item not found".into()))?;

    state
        .event_bus
        .emit_deleted(EntityKind::Item, broadcast_payload(&item));

    Ok(StatusCode::NO_CONTENT)
}
