//! Domain models for the marketplace store
//!
//! Row structs (`Db*`) mirror the SQL schema via `sqlx::FromRow` and keep
//! status columns as text; domain structs carry parsed enums and are what
//! the API serializes (and what broadcast payloads contain).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Status enums
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Available,
    Pending,
    Traded,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Available => "available",
            ItemStatus::Pending => "pending",
            ItemStatus::Traded => "traded",
        }
    }
}

impl FromStr for ItemStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(ItemStatus::Available),
            "pending" => Ok(ItemStatus::Pending),
            "traded" => Ok(ItemStatus::Traded),
            other => Err(format!("unknown item status: {other}")),
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfferStatus {
    Pending,
    Accepted,
    Rejected,
    Withdrawn,
}

impl OfferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OfferStatus::Pending => "pending",
            OfferStatus::Accepted => "accepted",
            OfferStatus::Rejected => "rejected",
            OfferStatus::Withdrawn => "withdrawn",
        }
    }
}

impl FromStr for OfferStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OfferStatus::Pending),
            "accepted" => Ok(OfferStatus::Accepted),
            "rejected" => Ok(OfferStatus::Rejected),
            "withdrawn" => Ok(OfferStatus::Withdrawn),
            other => Err(format!("unknown offer status: {other}")),
        }
    }
}

impl fmt::Display for OfferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Domain structs
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub bio: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub category: String,
    pub status: ItemStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Offer {
    pub id: Uuid,
    pub item_offered_id: Uuid,
    pub item_requested_id: Uuid,
    pub from_user_id: Uuid,
    pub to_user_id: Uuid,
    pub status: OfferStatus,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Trade {
    pub id: Uuid,
    pub offer_id: Uuid,
    pub item_a_id: Uuid,
    pub item_b_id: Uuid,
    pub user_a_id: Uuid,
    pub user_b_id: Uuid,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Rating {
    pub id: Uuid,
    pub trade_id: Uuid,
    pub rater_id: Uuid,
    pub ratee_id: Uuid,
    pub score: i32,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ActivityEntry {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub action: String,
    pub detail: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Row structs (text statuses, straight from SQL)
// ============================================================================

#[derive(Debug, Clone, FromRow)]
pub(crate) struct DbUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub bio: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<DbUser> for User {
    fn from(row: DbUser) -> Self {
        User {
            id: row.id,
            username: row.username,
            email: row.email,
            bio: row.bio,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub(crate) struct DbItem {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub category: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub(crate) struct DbOffer {
    pub id: Uuid,
    pub item_offered_id: Uuid,
    pub item_requested_id: Uuid,
    pub from_user_id: Uuid,
    pub to_user_id: Uuid,
    pub status: String,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Mutation requests
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct CreateUser {
    pub username: String,
    pub email: String,
    pub bio: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateUser {
    pub email: Option<String>,
    pub bio: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateItem {
    pub owner_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    #[serde(default = "default_category")]
    pub category: String,
}

fn default_category() -> String {
    "general".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateItem {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub status: Option<ItemStatus>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateOffer {
    pub item_offered_id: Uuid,
    pub item_requested_id: Uuid,
    pub from_user_id: Uuid,
    pub to_user_id: Uuid,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateRating {
    pub trade_id: Uuid,
    pub rater_id: Uuid,
    pub ratee_id: Uuid,
    pub score: i32,
    pub comment: Option<String>,
}

/// Result of accepting an offer: everything mutated in the transaction,
/// so the handler can emit one event per changed row.
#[derive(Debug, Clone)]
pub struct AcceptedOffer {
    pub offer: Offer,
    pub trade: Trade,
    pub item_offered: Item,
    pub item_requested: Item,
}
