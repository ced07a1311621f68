//! Offer handlers: create, accept, reject, withdraw
//!
//! Accepting an offer is the one multi-row mutation in the system. The store
//! commits offer + trade + item updates in a single transaction; this handler
//! then emits one event per changed row so connected clients converge without
//! refetching.

use super::handlers::{broadcast_payload, record_activity, AppError};
use crate::events::{EntityKind, EventEmitter};
use crate::store::{CreateOffer, OfferStatus};
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
pub struct OffersQuery {
    /// Offers sent or received by this user
    pub user_id: Option<Uuid>,
    pub status: Option<OfferStatus>,
}

/// `GET /api/offers`
pub async fn list_offers(
    State(state): State<AppState>,
    Query(query): Query<OffersQuery>,
) -> Result<impl IntoResponse, AppError> {
    let offers = state.store.list_offers(query.user_id, query.status).await?;
    Ok(Json(offers))
}

/// `GET /api/offers/{id}`
pub async fn get_offer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let offer = state
        .store
        .get_offer(id)
        .await?
        .ok_or_else(|| AppError::NotFound("offer not found".into()))?;
    Ok(Json(offer))
}

/// `POST /api/offers`
pub async fn create_offer(
    State(state): State<AppState>,
    Json(req): Json<CreateOffer>,
) -> Result<impl IntoResponse, AppError> {
    let offer = state.store.create_offer(req).await?;

    state
        .event_bus
        .emit_created(EntityKind::Offer, broadcast_payload(&offer));
    record_activity(
        &state,
        Some(offer.from_user_id),
        "offer_created",
        json!({"offer_id": offer.id, "to_user_id": offer.to_user_id}),
    )
    .await;

    Ok((StatusCode::CREATED, Json(offer)))
}

/// `POST /api/offers/{id}/accept` — forms a trade and marks both items traded
pub async fn accept_offer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let accepted = state.store.accept_offer(id).await?;

    // One event per row changed in the transaction
    state
        .event_bus
        .emit_updated(EntityKind::Offer, broadcast_payload(&accepted.offer));
    state
        .event_bus
        .emit_created(EntityKind::Trade, broadcast_payload(&accepted.trade));
    state
        .event_bus
        .emit_updated(EntityKind::Item, broadcast_payload(&accepted.item_offered));
    state.event_bus.emit_updated(
        EntityKind::Item,
        broadcast_payload(&accepted.item_requested),
    );

    record_activity(
        &state,
        Some(accepted.offer.to_user_id),
        "offer_accepted",
        json!({"offer_id": accepted.offer.id, "trade_id": accepted.trade.id}),
    )
    .await;

    Ok(Json(accepted.trade))
}

/// `POST /api/offers/{id}/reject`
pub async fn reject_offer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let offer = state.store.close_offer(id, OfferStatus::Rejected).await?;

    state
        .event_bus
        .emit_updated(EntityKind::Offer, broadcast_payload(&offer));
    record_activity(
        &state,
        Some(offer.to_user_id),
        "offer_rejected",
        json!({"offer_id": offer.id}),
    )
    .await;

    Ok(Json(offer))
}

/// `DELETE /api/offers/{id}` — sender withdraws a pending offer
pub async fn withdraw_offer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let offer = state.store.close_offer(id, OfferStatus::Withdrawn).await?;

    state
        .event_bus
        .emit_updated(EntityKind::Offer, broadcast_payload(&offer));

    Ok(Json(offer))
}
