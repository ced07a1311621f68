//! PostgreSQL-backed store for marketplace entities
//!
//! Request handlers share a `PgPool`; the change-notification bridge holds
//! its own dedicated connection (see [`crate::events::ChangeListener`]).
//! Durability and constraint enforcement (uniqueness, foreign keys) live in
//! the database; this layer maps rows to domain types and keeps multi-row
//! mutations transactional.

pub mod models;

pub use models::*;

use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    InvalidState(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("corrupt row: {0}")]
    CorruptRow(String),
}

/// Durable store over Postgres.
#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    /// Connect and run migrations. Fails startup rather than serving
    /// requests against a missing schema.
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await.map_err(|e| {
            StoreError::Database(sqlx::Error::Migrate(Box::new(e)))
        })?;

        Ok(Self { pool })
    }

    /// Wrap an existing pool (tests, tooling).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    pub async fn list_users(&self) -> StoreResult<Vec<User>> {
        let rows = sqlx::query_as::<_, DbUser>(
            "SELECT id, username, email, bio, created_at FROM users ORDER BY username",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    pub async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, DbUser>(
            "SELECT id, username, email, bio, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    pub async fn create_user(&self, req: CreateUser) -> StoreResult<User> {
        let row = sqlx::query_as::<_, DbUser>(
            r#"INSERT INTO users (username, email, bio) VALUES ($1, $2, $3)
               RETURNING id, username, email, bio, created_at"#,
        )
        .bind(&req.username)
        .bind(&req.email)
        .bind(&req.bio)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_or(e, "username or email already taken"))?;
        Ok(User::from(row))
    }

    pub async fn update_user(&self, id: Uuid, req: UpdateUser) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, DbUser>(
            r#"UPDATE users SET email = COALESCE($2, email), bio = COALESCE($3, bio)
               WHERE id = $1
               RETURNING id, username, email, bio, created_at"#,
        )
        .bind(id)
        .bind(&req.email)
        .bind(&req.bio)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| conflict_or(e, "email already taken"))?;
        Ok(row.map(User::from))
    }

    pub async fn delete_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, DbUser>(
            r#"DELETE FROM users WHERE id = $1
               RETURNING id, username, email, bio, created_at"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    // ------------------------------------------------------------------
    // Items
    // ------------------------------------------------------------------

    pub async fn list_items(
        &self,
        owner_id: Option<Uuid>,
        status: Option<ItemStatus>,
        category: Option<&str>,
    ) -> StoreResult<Vec<Item>> {
        let rows = sqlx::query_as::<_, DbItem>(
            r#"SELECT id, owner_id, name, description, category, status, created_at, updated_at
               FROM items
               WHERE ($1::uuid IS NULL OR owner_id = $1)
                 AND ($2::text IS NULL OR status = $2)
                 AND ($3::text IS NULL OR category = $3)
               ORDER BY created_at DESC"#,
        )
        .bind(owner_id)
        .bind(status.map(|s| s.as_str()))
        .bind(category)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(item_from_db).collect()
    }

    pub async fn get_item(&self, id: Uuid) -> StoreResult<Option<Item>> {
        let row = sqlx::query_as::<_, DbItem>(
            r#"SELECT id, owner_id, name, description, category, status, created_at, updated_at
               FROM items WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(item_from_db).transpose()
    }

    pub async fn create_item(&self, req: CreateItem) -> StoreResult<Item> {
        let row = sqlx::query_as::<_, DbItem>(
            r#"INSERT INTO items (owner_id, name, description, category) VALUES ($1, $2, $3, $4)
               RETURNING id, owner_id, name, description, category, status, created_at, updated_at"#,
        )
        .bind(req.owner_id)
        .bind(&req.name)
        .bind(&req.description)
        .bind(&req.category)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_or(e, "item conflict"))?;
        item_from_db(row)
    }

    pub async fn update_item(&self, id: Uuid, req: UpdateItem) -> StoreResult<Option<Item>> {
        let row = sqlx::query_as::<_, DbItem>(
            r#"UPDATE items SET
                 name = COALESCE($2, name),
                 description = COALESCE($3, description),
                 category = COALESCE($4, category),
                 status = COALESCE($5, status),
                 updated_at = now()
               WHERE id = $1
               RETURNING id, owner_id, name, description, category, status, created_at, updated_at"#,
        )
        .bind(id)
        .bind(&req.name)
        .bind(&req.description)
        .bind(&req.category)
        .bind(req.status.map(|s| s.as_str()))
        .fetch_optional(&self.pool)
        .await?;
        row.map(item_from_db).transpose()
    }

    pub async fn delete_item(&self, id: Uuid) -> StoreResult<Option<Item>> {
        let row = sqlx::query_as::<_, DbItem>(
            r#"DELETE FROM items WHERE id = $1
               RETURNING id, owner_id, name, description, category, status, created_at, updated_at"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(item_from_db).transpose()
    }

    // ------------------------------------------------------------------
    // Offers
    // ------------------------------------------------------------------

    pub async fn list_offers(
        &self,
        user_id: Option<Uuid>,
        status: Option<OfferStatus>,
    ) -> StoreResult<Vec<Offer>> {
        let rows = sqlx::query_as::<_, DbOffer>(
            r#"SELECT id, item_offered_id, item_requested_id, from_user_id, to_user_id,
                      status, message, created_at
               FROM offers
               WHERE ($1::uuid IS NULL OR from_user_id = $1 OR to_user_id = $1)
                 AND ($2::text IS NULL OR status = $2)
               ORDER BY created_at DESC"#,
        )
        .bind(user_id)
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(offer_from_db).collect()
    }

    pub async fn get_offer(&self, id: Uuid) -> StoreResult<Option<Offer>> {
        let row = sqlx::query_as::<_, DbOffer>(
            r#"SELECT id, item_offered_id, item_requested_id, from_user_id, to_user_id,
                      status, message, created_at
               FROM offers WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(offer_from_db).transpose()
    }

    /// Create an offer. Both items must exist and be available, and an item
    /// cannot be offered against itself.
    pub async fn create_offer(&self, req: CreateOffer) -> StoreResult<Offer> {
        if req.item_offered_id == req.item_requested_id {
            return Err(StoreError::InvalidState(
                "cannot offer an item for itself".into(),
            ));
        }

        let mut tx = self.pool.begin().await?;

        for (item_id, role) in [
            (req.item_offered_id, "offered item"),
            (req.item_requested_id, "requested item"),
        ] {
            let status: Option<String> =
                sqlx::query_scalar("SELECT status FROM items WHERE id = $1")
                    .bind(item_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            match status.as_deref() {
                None => return Err(StoreError::NotFound("item")),
                Some("available") => {}
                Some(other) => {
                    return Err(StoreError::InvalidState(format!(
                        "{role} is not available (status: {other})"
                    )))
                }
            }
        }

        let row = sqlx::query_as::<_, DbOffer>(
            r#"INSERT INTO offers (item_offered_id, item_requested_id, from_user_id, to_user_id, message)
               VALUES ($1, $2, $3, $4, $5)
               RETURNING id, item_offered_id, item_requested_id, from_user_id, to_user_id,
                         status, message, created_at"#,
        )
        .bind(req.item_offered_id)
        .bind(req.item_requested_id)
        .bind(req.from_user_id)
        .bind(req.to_user_id)
        .bind(&req.message)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| conflict_or(e, "offer conflict"))?;

        tx.commit().await?;
        offer_from_db(row)
    }

    /// Accept a pending offer: mark it accepted, create the trade, and mark
    /// both items traded — one transaction, so the table triggers fire their
    /// notifications only on commit.
    pub async fn accept_offer(&self, id: Uuid) -> StoreResult<AcceptedOffer> {
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_as::<_, DbOffer>(
            r#"SELECT id, item_offered_id, item_requested_id, from_user_id, to_user_id,
                      status, message, created_at
               FROM offers WHERE id = $1 FOR UPDATE"#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::NotFound("offer"))?;

        if current.status != OfferStatus::Pending.as_str() {
            return Err(StoreError::InvalidState(format!(
                "offer is {} and cannot be accepted",
                current.status
            )));
        }

        let offer_row = sqlx::query_as::<_, DbOffer>(
            r#"UPDATE offers SET status = 'accepted' WHERE id = $1
               RETURNING id, item_offered_id, item_requested_id, from_user_id, to_user_id,
                         status, message, created_at"#,
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        let trade = sqlx::query_as::<_, Trade>(
            r#"INSERT INTO trades (offer_id, item_a_id, item_b_id, user_a_id, user_b_id)
               VALUES ($1, $2, $3, $4, $5)
               RETURNING id, offer_id, item_a_id, item_b_id, user_a_id, user_b_id, completed_at"#,
        )
        .bind(offer_row.id)
        .bind(offer_row.item_offered_id)
        .bind(offer_row.item_requested_id)
        .bind(offer_row.from_user_id)
        .bind(offer_row.to_user_id)
        .fetch_one(&mut *tx)
        .await?;

        let mut traded_items = Vec::with_capacity(2);
        for item_id in [offer_row.item_offered_id, offer_row.item_requested_id] {
            let row = sqlx::query_as::<_, DbItem>(
                r#"UPDATE items SET status = 'traded', updated_at = now() WHERE id = $1
                   RETURNING id, owner_id, name, description, category, status, created_at, updated_at"#,
            )
            .bind(item_id)
            .fetch_one(&mut *tx)
            .await?;
            traded_items.push(item_from_db(row)?);
        }

        tx.commit().await?;

        let item_requested = traded_items.pop().expect("two items updated");
        let item_offered = traded_items.pop().expect("two items updated");

        Ok(AcceptedOffer {
            offer: offer_from_db(offer_row)?,
            trade,
            item_offered,
            item_requested,
        })
    }

    /// Move a pending offer to `rejected` or `withdrawn`.
    pub async fn close_offer(&self, id: Uuid, status: OfferStatus) -> StoreResult<Offer> {
        debug_assert!(matches!(
            status,
            OfferStatus::Rejected | OfferStatus::Withdrawn
        ));

        let mut tx = self.pool.begin().await?;

        let current: Option<String> =
            sqlx::query_scalar("SELECT status FROM offers WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        match current.as_deref() {
            None => return Err(StoreError::NotFound("offer")),
            Some("pending") => {}
            Some(other) => {
                return Err(StoreError::InvalidState(format!(
                    "offer is {other} and cannot be {status}"
                )))
            }
        }

        let row = sqlx::query_as::<_, DbOffer>(
            r#"UPDATE offers SET status = $2 WHERE id = $1
               RETURNING id, item_offered_id, item_requested_id, from_user_id, to_user_id,
                         status, message, created_at"#,
        )
        .bind(id)
        .bind(status.as_str())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        offer_from_db(row)
    }

    // ------------------------------------------------------------------
    // Trades
    // ------------------------------------------------------------------

    pub async fn list_trades(&self, user_id: Option<Uuid>) -> StoreResult<Vec<Trade>> {
        let trades = sqlx::query_as::<_, Trade>(
            r#"SELECT id, offer_id, item_a_id, item_b_id, user_a_id, user_b_id, completed_at
               FROM trades
               WHERE ($1::uuid IS NULL OR user_a_id = $1 OR user_b_id = $1)
               ORDER BY completed_at DESC"#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(trades)
    }

    pub async fn get_trade(&self, id: Uuid) -> StoreResult<Option<Trade>> {
        let trade = sqlx::query_as::<_, Trade>(
            r#"SELECT id, offer_id, item_a_id, item_b_id, user_a_id, user_b_id, completed_at
               FROM trades WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(trade)
    }

    // ------------------------------------------------------------------
    // Ratings
    // ------------------------------------------------------------------

    pub async fn list_ratings(&self, ratee_id: Option<Uuid>) -> StoreResult<Vec<Rating>> {
        let ratings = sqlx::query_as::<_, Rating>(
            r#"SELECT id, trade_id, rater_id, ratee_id, score, comment, created_at
               FROM ratings
               WHERE ($1::uuid IS NULL OR ratee_id = $1)
               ORDER BY created_at DESC"#,
        )
        .bind(ratee_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ratings)
    }

    /// Create a rating. The rater must be a party to the trade and can rate
    /// each trade once (unique constraint).
    pub async fn create_rating(&self, req: CreateRating) -> StoreResult<Rating> {
        if !(1..=5).contains(&req.score) {
            return Err(StoreError::InvalidState(
                "score must be between 1 and 5".into(),
            ));
        }

        let participants: Option<PgRow> =
            sqlx::query("SELECT user_a_id, user_b_id FROM trades WHERE id = $1")
                .bind(req.trade_id)
                .fetch_optional(&self.pool)
                .await?;
        let row = participants.ok_or(StoreError::NotFound("trade"))?;
        let user_a: Uuid = row.get("user_a_id");
        let user_b: Uuid = row.get("user_b_id");
        if req.rater_id != user_a && req.rater_id != user_b {
            return Err(StoreError::InvalidState(
                "rater is not a party to this trade".into(),
            ));
        }

        let rating = sqlx::query_as::<_, Rating>(
            r#"INSERT INTO ratings (trade_id, rater_id, ratee_id, score, comment)
               VALUES ($1, $2, $3, $4, $5)
               RETURNING id, trade_id, rater_id, ratee_id, score, comment, created_at"#,
        )
        .bind(req.trade_id)
        .bind(req.rater_id)
        .bind(req.ratee_id)
        .bind(req.score)
        .bind(&req.comment)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_or(e, "trade already rated by this user"))?;
        Ok(rating)
    }

    pub async fn delete_rating(&self, id: Uuid) -> StoreResult<Option<Rating>> {
        let rating = sqlx::query_as::<_, Rating>(
            r#"DELETE FROM ratings WHERE id = $1
               RETURNING id, trade_id, rater_id, ratee_id, score, comment, created_at"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(rating)
    }

    // ------------------------------------------------------------------
    // Activity log
    // ------------------------------------------------------------------

    pub async fn list_activity(&self, limit: i64) -> StoreResult<Vec<ActivityEntry>> {
        let entries = sqlx::query_as::<_, ActivityEntry>(
            r#"SELECT id, user_id, action, detail, created_at
               FROM activity_log ORDER BY created_at DESC LIMIT $1"#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    pub async fn log_activity(
        &self,
        user_id: Option<Uuid>,
        action: &str,
        detail: Option<serde_json::Value>,
    ) -> StoreResult<ActivityEntry> {
        let entry = sqlx::query_as::<_, ActivityEntry>(
            r#"INSERT INTO activity_log (user_id, action, detail) VALUES ($1, $2, $3)
               RETURNING id, user_id, action, detail, created_at"#,
        )
        .bind(user_id)
        .bind(action)
        .bind(&detail)
        .fetch_one(&self.pool)
        .await?;
        Ok(entry)
    }
}

fn item_from_db(row: DbItem) -> StoreResult<Item> {
    let status = row
        .status
        .parse()
        .map_err(|e: String| StoreError::CorruptRow(e))?;
    Ok(Item {
        id: row.id,
        owner_id: row.owner_id,
        name: row.name,
        description: row.description,
        category: row.category,
        status,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

fn offer_from_db(row: DbOffer) -> StoreResult<Offer> {
    let status = row
        .status
        .parse()
        .map_err(|e: String| StoreError::CorruptRow(e))?;
    Ok(Offer {
        id: row.id,
        item_offered_id: row.item_offered_id,
        item_requested_id: row.item_requested_id,
        from_user_id: row.from_user_id,
        to_user_id: row.to_user_id,
        status,
        message: row.message,
        created_at: row.created_at,
    })
}

fn conflict_or(err: sqlx::Error, message: &str) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.code().map(|code| code == "23505").unwrap_or(false) {
            return StoreError::Conflict(message.to_string());
        }
        if db_err.code().map(|code| code == "23503").unwrap_or(false) {
            return StoreError::NotFound("referenced row");
        }
    }
    StoreError::Database(err)
}
