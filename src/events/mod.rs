//! Change event system for real-time WebSocket notifications
//!
//! This module provides:
//! - `ChangeEvent` / `BroadcastMessage` — typed events emitted after every mutation
//! - `EventBus` — broadcast hub distributing messages to WebSocket clients
//! - `ChangeListener` — Postgres LISTEN/NOTIFY bridge feeding the same hub
//!
//! Two producers feed the hub for the same logical write: the REST handler
//! (after commit) and the database trigger via the bridge. They are not
//! deduplicated server-side; clients reconcile idempotently per id (see
//! [`crate::client`]).

mod bridge;
mod bus;
mod types;

pub use bridge::{translate, ChangeListener};
pub use bus::EventBus;
pub use types::{
    BroadcastMessage, ChangeAction, ChangeEvent, EntityKind, EventEmitter, ACTIVITY_LOG_EVENT,
};
