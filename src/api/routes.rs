//! API route definitions

use super::{handlers, item_handlers, offer_handlers, trade_handlers, user_handlers, ws_handlers};
use crate::AppState;
use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(handlers::health))
        // ====================================================================
        // Items
        // ====================================================================
        .route(
            "/api/items",
            get(item_handlers::list_items).post(item_handlers::create_item),
        )
        .route(
            "/api/items/{id}",
            get(item_handlers::get_item)
                .patch(item_handlers::update_item)
                .delete(item_handlers::delete_item),
        )
        // ====================================================================
        // Users
        // ====================================================================
        .route(
            "/api/users",
            get(user_handlers::list_users).post(user_handlers::create_user),
        )
        .route(
            "/api/users/{id}",
            get(user_handlers::get_user)
                .patch(user_handlers::update_user)
                .delete(user_handlers::delete_user),
        )
        // ====================================================================
        // Offers
        // ====================================================================
        .route(
            "/api/offers",
            get(offer_handlers::list_offers).post(offer_handlers::create_offer),
        )
        .route(
            "/api/offers/{id}",
            get(offer_handlers::get_offer).delete(offer_handlers::withdraw_offer),
        )
        .route("/api/offers/{id}/accept", post(offer_handlers::accept_offer))
        .route("/api/offers/{id}/reject", post(offer_handlers::reject_offer))
        // ====================================================================
        // Trades (read-only; created by accepting offers)
        // ====================================================================
        .route("/api/trades", get(trade_handlers::list_trades))
        .route("/api/trades/{id}", get(trade_handlers::get_trade))
        // Ratings
        .route(
            "/api/ratings",
            get(trade_handlers::list_ratings).post(trade_handlers::create_rating),
        )
        .route("/api/ratings/{id}", delete(trade_handlers::delete_rating))
        // Activity feed
        .route(
            "/api/activity",
            get(handlers::list_activity).post(handlers::create_activity),
        )
        // Real-time change notifications
        .route("/ws/events", get(ws_handlers::ws_events))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
