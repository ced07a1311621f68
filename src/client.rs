//! Client-side reconciliation of broadcast messages
//!
//! The browser (or any other consumer) fetches each collection once over
//! REST at startup, then keeps it eventually consistent by applying the
//! broadcast stream. Both producers (REST handler and database trigger) may
//! emit independently for the same write, so applying a message must be
//! idempotent per id:
//!
//! - `created`: append only if no element with the same id exists
//! - `updated`: replace the matching element; no-op when absent (an update
//!   never synthesizes an insert)
//! - `deleted`: remove the matching element; no-op when absent
//!
//! This module is the reference implementation of that contract, used by
//! integration tests and by native consumers of the event stream.

use crate::events::{BroadcastMessage, ChangeAction, EntityKind};
use serde_json::Value;

/// Identifier field shared by every entity row.
const ID_FIELD: &str = "id";

/// One locally cached entity collection, keyed by the `id` field.
#[derive(Debug, Clone, Default)]
pub struct EntityCache {
    items: Vec<Value>,
}

impl EntityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the cache from an initial REST fetch, replacing any prior state.
    pub fn reset(&mut self, items: Vec<Value>) {
        self.items = items;
    }

    pub fn items(&self) -> &[Value] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: &Value) -> Option<&Value> {
        self.items.iter().find(|item| &item[ID_FIELD] == id)
    }

    /// Apply one change to the collection. Rows without an `id` field are
    /// ignored; the pipeline treats payloads as opaque and cannot key them.
    pub fn apply(&mut self, action: ChangeAction, payload: &Value) {
        let Some(id) = payload.get(ID_FIELD).filter(|id| !id.is_null()) else {
            return;
        };

        let position = self.items.iter().position(|item| &item[ID_FIELD] == id);

        match (action, position) {
            (ChangeAction::Created, None) => self.items.push(payload.clone()),
            (ChangeAction::Created, Some(_)) => {
                // Duplicate delivery (both producers fired) — keep one row
            }
            (ChangeAction::Updated, Some(idx)) => self.items[idx] = payload.clone(),
            (ChangeAction::Updated, None) => {}
            (ChangeAction::Deleted, Some(idx)) => {
                self.items.remove(idx);
            }
            (ChangeAction::Deleted, None) => {}
        }
    }
}

/// All five entity collections plus the activity feed, driven by the raw
/// broadcast stream.
#[derive(Debug, Clone, Default)]
pub struct ClientState {
    pub items: EntityCache,
    pub users: EntityCache,
    pub trades: EntityCache,
    pub offers: EntityCache,
    pub ratings: EntityCache,
    /// Activity entries are append-only; the server never updates or
    /// deletes them over the wire.
    pub activity: Vec<Value>,
}

impl ClientState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route a broadcast message to the right collection. Unknown event
    /// names are ignored.
    pub fn apply_message(&mut self, message: &BroadcastMessage) {
        if message.event == crate::events::ACTIVITY_LOG_EVENT {
            self.activity.push(message.data.clone());
            return;
        }

        let Some((entity, action)) = parse_event_name(&message.event) else {
            return;
        };

        let cache = match entity {
            EntityKind::Item => &mut self.items,
            EntityKind::User => &mut self.users,
            EntityKind::Trade => &mut self.trades,
            EntityKind::Offer => &mut self.offers,
            EntityKind::Rating => &mut self.ratings,
        };
        cache.apply(action, &message.data);
    }
}

/// Split `"<entity>:<action>"` back into its parts. Returns `None` for
/// anything outside the fixed catalog.
fn parse_event_name(event: &str) -> Option<(EntityKind, ChangeAction)> {
    let (entity, action) = event.split_once(':')?;
    let entity = match entity {
        "item" => EntityKind::Item,
        "user" => EntityKind::User,
        "trade" => EntityKind::Trade,
        "offer" => EntityKind::Offer,
        "rating" => EntityKind::Rating,
        _ => return None,
    };
    let action = match action {
        "created" => ChangeAction::Created,
        "updated" => ChangeAction::Updated,
        "deleted" => ChangeAction::Deleted,
        _ => return None,
    };
    Some((entity, action))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_created_is_idempotent() {
        let mut cache = EntityCache::new();
        let row = json!({"id": "x", "name": "Bike"});

        cache.apply(ChangeAction::Created, &row);
        cache.apply(ChangeAction::Created, &row);

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.items()[0]["name"], "Bike");
    }

    #[test]
    fn test_duplicate_created_keeps_first_row() {
        let mut cache = EntityCache::new();
        cache.apply(ChangeAction::Created, &json!({"id": "x", "name": "Bike"}));
        // Second delivery from the other producer, same id
        cache.apply(ChangeAction::Created, &json!({"id": "x", "name": "Bike v2"}));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.items()[0]["name"], "Bike");
    }

    #[test]
    fn test_updated_replaces_matching_row() {
        let mut cache = EntityCache::new();
        cache.reset(vec![
            json!({"id": "a", "name": "Lamp"}),
            json!({"id": "b", "name": "Chair"}),
        ]);

        cache.apply(ChangeAction::Updated, &json!({"id": "b", "name": "Armchair"}));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&json!("b")).unwrap()["name"], "Armchair");
        assert_eq!(cache.get(&json!("a")).unwrap()["name"], "Lamp");
    }

    #[test]
    fn test_updated_missing_id_is_noop() {
        let mut cache = EntityCache::new();
        cache.reset(vec![json!({"id": "a", "name": "Lamp"})]);

        cache.apply(ChangeAction::Updated, &json!({"id": "ghost", "name": "Ghost"}));

        // Never synthesizes an insert from an update
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&json!("ghost")).is_none());
    }

    #[test]
    fn test_deleted_removes_matching_row() {
        let mut cache = EntityCache::new();
        cache.reset(vec![
            json!({"id": "a"}),
            json!({"id": "b"}),
        ]);

        cache.apply(ChangeAction::Deleted, &json!({"id": "a"}));

        assert_eq!(cache.len(), 1);
        assert!(cache.get(&json!("a")).is_none());
    }

    #[test]
    fn test_deleted_missing_id_is_noop() {
        let mut cache = EntityCache::new();
        cache.reset(vec![json!({"id": "a"})]);

        cache.apply(ChangeAction::Deleted, &json!({"id": "ghost"}));

        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_payload_without_id_is_ignored() {
        let mut cache = EntityCache::new();
        cache.apply(ChangeAction::Created, &json!({"name": "no id"}));
        cache.apply(ChangeAction::Created, &serde_json::Value::Null);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_client_state_routes_by_event_name() {
        let mut state = ClientState::new();

        state.apply_message(&BroadcastMessage::new(
            "item:created",
            json!({"id": "i-1", "name": "Bike"}),
        ));
        state.apply_message(&BroadcastMessage::new(
            "offer:created",
            json!({"id": "o-1"}),
        ));
        state.apply_message(&BroadcastMessage::new(
            "item:deleted",
            json!({"id": "i-1"}),
        ));

        assert!(state.items.is_empty());
        assert_eq!(state.offers.len(), 1);
    }

    #[test]
    fn test_client_state_activity_appends() {
        let mut state = ClientState::new();
        state.apply_message(&BroadcastMessage::new(
            "activity_log_update",
            json!({"id": "a-1", "action": "item_created"}),
        ));
        state.apply_message(&BroadcastMessage::new(
            "activity_log_update",
            json!({"id": "a-2", "action": "offer_accepted"}),
        ));
        assert_eq!(state.activity.len(), 2);
    }

    #[test]
    fn test_unknown_event_name_ignored() {
        let mut state = ClientState::new();
        state.apply_message(&BroadcastMessage::new("session:created", json!({"id": "s"})));
        state.apply_message(&BroadcastMessage::new("item:upserted", json!({"id": "i"})));
        state.apply_message(&BroadcastMessage::new("noseparator", json!({"id": "n"})));
        assert!(state.items.is_empty());
        assert!(state.users.is_empty());
    }

    #[test]
    fn test_out_of_order_duplicate_stream_converges() {
        // REST-direct and bridge events for the same writes, interleaved
        let mut state = ClientState::new();
        let created = BroadcastMessage::new("item:created", json!({"id": "x", "status": "available"}));
        let updated = BroadcastMessage::new("item:updated", json!({"id": "x", "status": "traded"}));

        state.apply_message(&created);
        state.apply_message(&created); // duplicate from second producer
        state.apply_message(&updated);
        state.apply_message(&updated); // duplicate from second producer

        assert_eq!(state.items.len(), 1);
        assert_eq!(state.items.items()[0]["status"], "traded");
    }
}
