//! User CRUD handlers

use super::handlers::{broadcast_payload, record_activity, AppError};
use crate::events::{EntityKind, EventEmitter};
use crate::store::{CreateUser, UpdateUser};
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;
use uuid::Uuid;

/// `GET /api/users`
pub async fn list_users(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let users = state.store.list_users().await?;
    Ok(Json(users))
}

/// `GET /api/users/{id}`
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .store
        .get_user(id)
        .await?
        .ok_or_else(|| AppError::NotFound("user not found".into()))?;
    Ok(Json(user))
}

/// `POST /api/users`
pub async fn create_user(
    State(state): State<AppState>,
    Json(req): Json<CreateUser>,
) -> Result<impl IntoResponse, AppError> {
    if req.username.trim().is_empty() {
        return Err(AppError::BadRequest("username cannot be empty".into()));
    }

    let user = state.store.create_user(req).await?;

    state
        .event_bus
        .emit_created(EntityKind::User, broadcast_payload(&user));
    record_activity(
        &state,
        Some(user.id),
        "user_joined",
        json!({"username": user.username}),
    )
    .await;

    Ok((StatusCode::CREATED, Json(user)))
}

/// `PATCH /api/users/{id}`
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateUser>,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .store
        .update_user(id, req)
        .await?
        .ok_or_else(|| AppError::NotFound("user not found".into()))?;

    state
        .event_bus
        .emit_updated(EntityKind::User, broadcast_payload(&user));

    Ok(Json(user))
}

/// `DELETE /api/users/{id}`
pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .store
        .delete_user(id)
        .await?
        .ok_or_else(|| AppError::NotFound("user not found".into()))?;

    state
        .event_bus
        .emit_deleted(EntityKind::User, broadcast_payload(&user));

    Ok(StatusCode::NO_CONTENT)
}
