//! API request handlers: shared error type, health check, activity feed

use crate::store::StoreError;
use crate::AppState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Error handling
// ============================================================================

/// API error — maps to an HTTP status and a `{"error": msg}` JSON body
pub enum AppError {
    Internal(anyhow::Error),
    NotFound(String),
    BadRequest(String),
    Conflict(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            AppError::Internal(e) => {
                tracing::error!("internal error: {e:#}");
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => AppError::NotFound(format!("{what} not found")),
            StoreError::Conflict(msg) => AppError::Conflict(msg),
            StoreError::InvalidState(msg) => AppError::BadRequest(msg),
            StoreError::Database(e) => AppError::Internal(e.into()),
            StoreError::CorruptRow(msg) => AppError::Internal(anyhow::anyhow!(msg)),
        }
    }
}

/// Serialize an entity for a broadcast payload. Serialization of our domain
/// types cannot fail; a Null payload is still harmless to clients (no `id`
/// field means they ignore it).
pub(crate) fn broadcast_payload<T: Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}

/// Record an activity entry and push it to connected clients.
///
/// Activity is a side channel: failures are logged and never surfaced to the
/// request that triggered them.
pub(crate) async fn record_activity(
    state: &AppState,
    user_id: Option<Uuid>,
    action: &str,
    detail: serde_json::Value,
) {
    match state.store.log_activity(user_id, action, Some(detail)).await {
        Ok(entry) => state.event_bus.emit_activity_log(broadcast_payload(&entry)),
        Err(e) => tracing::warn!(action = %action, "failed to record activity: {e}"),
    }
}

// ============================================================================
// Health check
// ============================================================================

/// Per-service health status in the health response
#[derive(Serialize)]
pub struct ServiceHealthStatus {
    pub database: String,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub services: ServiceHealthStatus,
}

/// Health check handler — verifies actual database connectivity.
///
/// Returns 200 + `"ok"` when the store answers `SELECT 1`, 503 + `"degraded"`
/// otherwise.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let database = match state.store.health_check().await {
        Ok(()) => "connected".to_string(),
        Err(e) => format!("error: {e}"),
    };

    let healthy = database == "connected";
    let response = HealthResponse {
        status: if healthy { "ok" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        services: ServiceHealthStatus { database },
    };

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(response))
}

// ============================================================================
// Activity feed
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ActivityQuery {
    #[serde(default = "default_activity_limit")]
    pub limit: i64,
}

fn default_activity_limit() -> i64 {
    50
}

#[derive(Debug, Deserialize)]
pub struct CreateActivityRequest {
    pub user_id: Option<Uuid>,
    pub action: String,
    pub detail: Option<serde_json::Value>,
}

/// `GET /api/activity` — recent activity entries, newest first
pub async fn list_activity(
    State(state): State<AppState>,
    Query(query): Query<ActivityQuery>,
) -> Result<impl IntoResponse, AppError> {
    let limit = query.limit.clamp(1, 500);
    let entries = state.store.list_activity(limit).await?;
    Ok(Json(entries))
}

/// `POST /api/activity` — append an entry and push it to connected clients
pub async fn create_activity(
    State(state): State<AppState>,
    Json(req): Json<CreateActivityRequest>,
) -> Result<impl IntoResponse, AppError> {
    let entry = state
        .store
        .log_activity(req.user_id, &req.action, req.detail)
        .await?;
    state.event_bus.emit_activity_log(broadcast_payload(&entry));
    Ok((StatusCode::CREATED, Json(entry)))
}
