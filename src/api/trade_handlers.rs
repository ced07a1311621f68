//! Trade and rating handlers
//!
//! Trades are read-only over the API; they are created by accepting an offer.

use super::handlers::{broadcast_payload, record_activity, AppError};
use crate::events::{EntityKind, EventEmitter};
use crate::store::CreateRating;
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
pub struct TradesQuery {
    /// Trades this user took part in
    pub user_id: Option<Uuid>,
}

/// `GET /api/trades`
pub async fn list_trades(
    State(state): State<AppState>,
    Query(query): Query<TradesQuery>,
) -> Result<impl IntoResponse, AppError> {
    let trades = state.store.list_trades(query.user_id).await?;
    Ok(Json(trades))
}

/// `GET /api/trades/{id}`
pub async fn get_trade(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let trade = state
        .store
        .get_trade(id)
        .await?
        .ok_or_else(|| AppError::NotFound("trade not found".into()))?;
    Ok(Json(trade))
}

#[derive(Debug, Deserialize, Default)]
pub struct RatingsQuery {
    pub ratee_id: Option<Uuid>,
}

/// `GET /api/ratings`
pub async fn list_ratings(
    State(state): State<AppState>,
    Query(query): Query<RatingsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let ratings = state.store.list_ratings(query.ratee_id).await?;
    Ok(Json(ratings))
}

/// `POST /api/ratings` — rate a counterparty after a trade, once per trade
pub async fn create_rating(
    State(state): State<AppState>,
    Json(req): Json<CreateRating>,
) -> Result<impl IntoResponse, AppError> {
    let rating = state.store.create_rating(req).await?;

    state
        .event_bus
        .emit_created(EntityKind::Rating, broadcast_payload(&rating));
    record_activity(
        &state,
        Some(rating.rater_id),
        "rating_created",
        json!({"trade_id": rating.trade_id, "score": rating.score}),
    )
    .await;

    Ok((StatusCode::CREATED, Json(rating)))
}

/// `DELETE /api/ratings/{id}`
pub async fn delete_rating(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let rating = state
        .store
        .delete_rating(id)
        .await?
        .ok_or_else(|| AppError::NotFound("rating not found".into()))?;

    state
        .event_bus
        .emit_deleted(EntityKind::Rating, broadcast_payload(&rating));

    Ok(StatusCode::NO_CONTENT)
}
