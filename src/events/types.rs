//! Change event types for WebSocket notifications

use serde::{Deserialize, Serialize};

/// Event name used for activity-log pushes, regardless of operation.
///
/// Activity entries are also emitted from internal (non-HTTP) code paths,
/// so they keep a dedicated event name instead of the `entity:action` form.
pub const ACTIVITY_LOG_EVENT: &str = "activity_log_update";

/// The kind of entity that was mutated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Item,
    User,
    Trade,
    Offer,
    Rating,
}

impl EntityKind {
    /// Entity name as it appears in event names (`item:created`)
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Item => "item",
            EntityKind::User => "user",
            EntityKind::Trade => "trade",
            EntityKind::Offer => "offer",
            EntityKind::Rating => "rating",
        }
    }
}

/// The mutation performed on an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    Created,
    Updated,
    Deleted,
}

impl ChangeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeAction::Created => "created",
            ChangeAction::Updated => "updated",
            ChangeAction::Deleted => "deleted",
        }
    }

    /// Map a Postgres trigger operation (`INSERT`/`UPDATE`/`DELETE`, any
    /// letter case) to its action. Unknown operations map to `None`.
    pub fn from_operation(op: &str) -> Option<Self> {
        match op.to_ascii_uppercase().as_str() {
            "INSERT" => Some(ChangeAction::Created),
            "UPDATE" => Some(ChangeAction::Updated),
            "DELETE" => Some(ChangeAction::Deleted),
            _ => None,
        }
    }
}

/// A change to a watched entity, in transit between a producer (REST handler
/// or notification bridge) and the broadcast hub.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub entity: EntityKind,
    pub action: ChangeAction,
    /// The affected row, as serialized by the store layer. Treated as opaque;
    /// the pipeline never inspects business fields.
    pub data: serde_json::Value,
}

impl ChangeEvent {
    pub fn new(entity: EntityKind, action: ChangeAction, data: serde_json::Value) -> Self {
        Self {
            entity,
            action,
            data,
        }
    }

    /// Event name delivered to clients: `<entity>:<action>`
    pub fn event_name(&self) -> String {
        format!("{}:{}", self.entity.as_str(), self.action.as_str())
    }
}

/// The message fanned out verbatim to every connected client.
///
/// Must be `Clone` for `tokio::sync::broadcast`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastMessage {
    /// Event name, e.g. `item:created` or `activity_log_update`
    pub event: String,
    /// Raw entity row (or activity entry)
    pub data: serde_json::Value,
    /// ISO 8601 emission timestamp
    pub timestamp: String,
}

impl BroadcastMessage {
    pub fn new(event: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            data,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

impl From<ChangeEvent> for BroadcastMessage {
    fn from(event: ChangeEvent) -> Self {
        let name = event.event_name();
        BroadcastMessage::new(name, event.data)
    }
}

/// Anything that can accept a change event for fan-out.
///
/// Fire-and-forget: implementations never block and never surface delivery
/// errors to the caller.
pub trait EventEmitter: Send + Sync {
    fn emit(&self, event: ChangeEvent);

    fn emit_created(&self, entity: EntityKind, data: serde_json::Value) {
        self.emit(ChangeEvent::new(entity, ChangeAction::Created, data));
    }

    fn emit_updated(&self, entity: EntityKind, data: serde_json::Value) {
        self.emit(ChangeEvent::new(entity, ChangeAction::Updated, data));
    }

    fn emit_deleted(&self, entity: EntityKind, data: serde_json::Value) {
        self.emit(ChangeEvent::new(entity, ChangeAction::Deleted, data));
    }
}
