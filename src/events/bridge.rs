//! Postgres LISTEN/NOTIFY bridge
//!
//! Holds one dedicated database connection subscribed to the per-entity
//! change channels and translates every notification into a broadcast hub
//! emit. This is the path that picks up changes made outside the API
//! (psql sessions, cron jobs), since the table triggers fire regardless of
//! who performed the write.

use super::{ChangeAction, ChangeEvent, EntityKind, EventBus, EventEmitter};
use serde::Deserialize;
use sqlx::postgres::PgListener;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// The watched channels and the entity each one carries.
const CHANNELS: [(&str, EntityKind); 5] = [
    ("item_changes", EntityKind::Item),
    ("user_changes", EntityKind::User),
    ("trade_changes", EntityKind::Trade),
    ("offer_changes", EntityKind::Offer),
    ("rating_changes", EntityKind::Rating),
];

/// Initial reconnect delay; doubles up to [`MAX_BACKOFF`] on repeated failures.
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Notification payload as produced by the table triggers:
/// `{"operation": "<INSERT|UPDATE|DELETE>", "data": { ...row }}`
#[derive(Debug, Deserialize)]
struct NotifyPayload {
    operation: String,
    #[serde(default)]
    data: serde_json::Value,
}

/// Long-lived subscriber relaying database change notifications to the hub.
///
/// The connection is exclusively owned by the bridge and never shared with
/// request handlers. The subscription runs in a supervised loop: on
/// connection loss it reconnects with exponential backoff and re-subscribes
/// to all channels. Events arriving during a disconnect window are lost;
/// clients reconcile on their next full fetch.
pub struct ChangeListener {
    database_url: String,
    bus: Arc<EventBus>,
}

impl ChangeListener {
    pub fn new(database_url: impl Into<String>, bus: Arc<EventBus>) -> Self {
        Self {
            database_url: database_url.into(),
            bus,
        }
    }

    /// Spawn the supervised listen loop as a background task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut backoff = INITIAL_BACKOFF;
            loop {
                match self.run_session().await {
                    Ok(()) => {
                        // recv() stream ended without error; treat as a drop
                        warn!("change listener stream closed, reconnecting");
                    }
                    Err(e) => {
                        error!("change listener connection error: {e}");
                    }
                }
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
        })
    }

    /// One connect-subscribe-receive session. Returns when the connection
    /// drops; the caller decides whether to reconnect.
    async fn run_session(&self) -> Result<(), sqlx::Error> {
        let mut listener = PgListener::connect(&self.database_url).await?;
        let names: Vec<&str> = CHANNELS.iter().map(|(name, _)| *name).collect();
        listener.listen_all(names).await?;
        info!(channels = CHANNELS.len(), "change listener subscribed");

        loop {
            let notification = listener.recv().await?;
            if let Some(event) = translate(notification.channel(), notification.payload()) {
                self.bus.emit(event);
            }
        }
    }
}

/// Translate one raw notification into a change event.
///
/// Total over `(channel, payload)`: unknown channels and malformed payloads
/// yield `None` (dropped, logged) and never panic.
pub fn translate(channel: &str, payload: &str) -> Option<ChangeEvent> {
    let entity = match CHANNELS.iter().find(|(name, _)| *name == channel) {
        Some((_, entity)) => *entity,
        None => {
            debug!(channel = %channel, "notification on unknown channel, ignoring");
            return None;
        }
    };

    let parsed: NotifyPayload = match serde_json::from_str(payload) {
        Ok(p) => p,
        Err(e) => {
            error!(channel = %channel, "malformed notification payload, dropping: {e}");
            return None;
        }
    };

    let action = match ChangeAction::from_operation(&parsed.operation) {
        Some(action) => action,
        None => {
            error!(
                channel = %channel,
                operation = %parsed.operation,
                "unknown notification operation, dropping"
            );
            return None;
        }
    };

    Some(ChangeEvent::new(entity, action, parsed.data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_known_channels_all_operations() {
        for (channel, entity) in CHANNELS {
            for (op, action) in [
                ("INSERT", ChangeAction::Created),
                ("insert", ChangeAction::Created),
                ("UPDATE", ChangeAction::Updated),
                ("update", ChangeAction::Updated),
                ("DELETE", ChangeAction::Deleted),
                ("Delete", ChangeAction::Deleted),
            ] {
                let payload = format!(r#"{{"operation": "{op}", "data": {{"id": "x"}}}}"#);
                let event = translate(channel, &payload).expect("known channel must translate");
                assert_eq!(event.entity, entity);
                assert_eq!(event.action, action);
                assert_eq!(event.data["id"], "x");
            }
        }
    }

    #[test]
    fn test_translate_unknown_channel_drops() {
        let payload = r#"{"operation": "INSERT", "data": {"id": "x"}}"#;
        assert!(translate("session_changes", payload).is_none());
        assert!(translate("", payload).is_none());
    }

    #[test]
    fn test_translate_invalid_json_drops() {
        assert!(translate("item_changes", "not json").is_none());
        assert!(translate("item_changes", "").is_none());
        assert!(translate("item_changes", "{\"operation\":").is_none());
    }

    #[test]
    fn test_translate_missing_operation_drops() {
        assert!(translate("item_changes", r#"{"data": {"id": "x"}}"#).is_none());
    }

    #[test]
    fn test_translate_unknown_operation_drops() {
        let payload = r#"{"operation": "TRUNCATE", "data": {}}"#;
        assert!(translate("user_changes", payload).is_none());
    }

    #[test]
    fn test_translate_missing_data_defaults_to_null() {
        let event = translate("trade_changes", r#"{"operation": "DELETE"}"#).unwrap();
        assert_eq!(event.action, ChangeAction::Deleted);
        assert!(event.data.is_null());
    }

    #[test]
    fn test_translate_emits_exactly_once_through_bus() {
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();

        let payload = r#"{"operation": "UPDATE", "data": {"id": "i-1", "status": "pending"}}"#;
        if let Some(event) = translate("item_changes", payload) {
            bus.emit(event);
        }

        let msg = rx.try_recv().unwrap();
        assert_eq!(msg.event, "item:updated");
        assert_eq!(msg.data["status"], "pending");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_malformed_payload_produces_zero_bus_calls() {
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();

        for (channel, payload) in [
            ("item_changes", "garbage"),
            ("item_changes", r#"{"data": {}}"#),
            ("mystery_changes", r#"{"operation": "INSERT", "data": {}}"#),
        ] {
            if let Some(event) = translate(channel, payload) {
                bus.emit(event);
            }
        }

        assert!(rx.try_recv().is_err());
    }
}
