use crate::{
    config::DatabaseConfig,
    model::{OfferStatus, PartyRole, TradeHistory, TradeOffer},
    AccountId, HistoryId, OfferId, Result,
};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Row, Sqlite, SqliteConnection, SqlitePool, Transaction,
};
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// SQLite-backed store for offers, inventory entries and trade history.
///
/// The pool is capped at a single writer connection: every transaction runs
/// to completion before the next begins, which, combined with the
/// compare-and-set status transitions below, serializes conflicting
/// accept/cancel/expire attempts.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self> {
        Self::with_options(database_url, 1, Duration::from_secs(30)).await
    }

    pub async fn from_config(config: &DatabaseConfig) -> Result<Self> {
        Self::with_options(
            &config.url,
            config.max_connections.unwrap_or(1),
            Duration::from_secs(config.busy_timeout_seconds.unwrap_or(30)),
        )
        .await
    }

    async fn with_options(
        database_url: &str,
        max_connections: u32,
        busy_timeout: Duration,
    ) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(busy_timeout);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS offers (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                owner_name TEXT NOT NULL,
                offering_items TEXT NOT NULL,
                requesting_items TEXT NOT NULL,
                status TEXT NOT NULL,
                message TEXT,
                created_at DATETIME NOT NULL,
                expires_at DATETIME NOT NULL,
                completed_at DATETIME,
                completed_by TEXT,
                completed_by_name TEXT
            );

            CREATE TABLE IF NOT EXISTS inventory (
                account_id TEXT NOT NULL,
                item_id TEXT NOT NULL,
                quantity INTEGER NOT NULL CHECK (quantity >= 0),
                PRIMARY KEY (account_id, item_id)
            );

            CREATE TABLE IF NOT EXISTS trade_history (
                id TEXT PRIMARY KEY,
                offer_id TEXT NOT NULL,
                seller_id TEXT NOT NULL,
                buyer_id TEXT NOT NULL,
                offered_items TEXT NOT NULL,
                requested_items TEXT NOT NULL,
                completed_at DATETIME NOT NULL,
                seller_rating INTEGER,
                seller_comment TEXT,
                buyer_rating INTEGER,
                buyer_comment TEXT,
                FOREIGN KEY (offer_id) REFERENCES offers(id)
            );

            CREATE INDEX IF NOT EXISTS idx_offers_status ON offers(status);
            CREATE INDEX IF NOT EXISTS idx_offers_status_expires ON offers(status, expires_at);
            CREATE INDEX IF NOT EXISTS idx_history_seller ON trade_history(seller_id);
            CREATE INDEX IF NOT EXISTS idx_history_buyer ON trade_history(buyer_id);
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn insert_offer(conn: &mut SqliteConnection, offer: &TradeOffer) -> Result<()> {
        let offering = serde_json::to_string(&offer.offering_items)?;
        let requesting = serde_json::to_string(&offer.requesting_items)?;
        sqlx::query(
            r#"
            INSERT INTO offers (id, owner_id, owner_name, offering_items, requesting_items, status, message, created_at, expires_at, completed_at, completed_by, completed_by_name)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(offer.id.to_string())
        .bind(offer.owner_id.to_string())
        .bind(&offer.owner_name)
        .bind(offering)
        .bind(requesting)
        .bind(offer.status.as_str())
        .bind(&offer.message)
        .bind(offer.created_at)
        .bind(offer.expires_at)
        .bind(offer.completed_at)
        .bind(offer.completed_by.map(|id| id.to_string()))
        .bind(&offer.completed_by_name)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub async fn fetch_offer(
        conn: &mut SqliteConnection,
        offer_id: OfferId,
    ) -> Result<Option<TradeOffer>> {
        let row = sqlx::query(
            r#"
            SELECT id, owner_id, owner_name, offering_items, requesting_items, status, message, created_at, expires_at, completed_at, completed_by, completed_by_name
            FROM offers WHERE id = ?
            "#,
        )
        .bind(offer_id.to_string())
        .fetch_optional(&mut *conn)
        .await?;

        row.map(offer_from_row).transpose()
    }

    pub async fn get_offer(&self, offer_id: OfferId) -> Result<Option<TradeOffer>> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch_offer(&mut conn, offer_id).await
    }

    /// Offers that are active and unexpired as of `now`. The time filter is
    /// re-applied at read time; a lagging sweep must not leak lapsed offers
    /// into listings.
    pub async fn list_available_offers(&self, now: DateTime<Utc>) -> Result<Vec<TradeOffer>> {
        let rows = sqlx::query(
            r#"
            SELECT id, owner_id, owner_name, offering_items, requesting_items, status, message, created_at, expires_at, completed_at, completed_by, completed_by_name
            FROM offers WHERE status = 'active' AND expires_at > ?
            ORDER BY created_at DESC
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(offer_from_row).collect()
    }

    /// Active offers whose deadline has passed, oldest first.
    pub async fn lapsed_offer_ids(&self, now: DateTime<Utc>) -> Result<Vec<OfferId>> {
        let rows = sqlx::query(
            r#"
            SELECT id FROM offers WHERE status = 'active' AND expires_at < ?
            ORDER BY expires_at ASC
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| Ok(Uuid::parse_str(&row.get::<String, _>(0))?))
            .collect()
    }

    /// Compare-and-set transition out of `active`. Returns false when the
    /// offer was already finalized by a concurrent transaction, in which
    /// case the caller must roll back.
    pub async fn finalize_offer(
        conn: &mut SqliteConnection,
        offer_id: OfferId,
        status: OfferStatus,
        completed_at: Option<DateTime<Utc>>,
        completed_by: Option<AccountId>,
        completed_by_name: Option<&str>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE offers
            SET status = ?, completed_at = ?, completed_by = ?, completed_by_name = ?
            WHERE id = ? AND status = 'active'
            "#,
        )
        .bind(status.as_str())
        .bind(completed_at)
        .bind(completed_by.map(|id| id.to_string()))
        .bind(completed_by_name)
        .bind(offer_id.to_string())
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn insert_history(conn: &mut SqliteConnection, history: &TradeHistory) -> Result<()> {
        let offered = serde_json::to_string(&history.offered_items)?;
        let requested = serde_json::to_string(&history.requested_items)?;
        sqlx::query(
            r#"
            INSERT INTO trade_history (id, offer_id, seller_id, buyer_id, offered_items, requested_items, completed_at, seller_rating, seller_comment, buyer_rating, buyer_comment)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(history.id.to_string())
        .bind(history.offer_id.to_string())
        .bind(history.seller_id.to_string())
        .bind(history.buyer_id.to_string())
        .bind(offered)
        .bind(requested)
        .bind(history.completed_at)
        .bind(history.seller_rating)
        .bind(&history.seller_comment)
        .bind(history.buyer_rating)
        .bind(&history.buyer_comment)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub async fn get_history(&self, history_id: HistoryId) -> Result<Option<TradeHistory>> {
        let row = sqlx::query(
            r#"
            SELECT id, offer_id, seller_id, buyer_id, offered_items, requested_items, completed_at, seller_rating, seller_comment, buyer_rating, buyer_comment
            FROM trade_history WHERE id = ?
            "#,
        )
        .bind(history_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(history_from_row).transpose()
    }

    pub async fn list_history_for_account(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<TradeHistory>> {
        let rows = sqlx::query(
            r#"
            SELECT id, offer_id, seller_id, buyer_id, offered_items, requested_items, completed_at, seller_rating, seller_comment, buyer_rating, buyer_comment
            FROM trade_history WHERE seller_id = ? OR buyer_id = ?
            ORDER BY completed_at DESC
            "#,
        )
        .bind(account_id.to_string())
        .bind(account_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(history_from_row).collect()
    }

    /// One-shot rating write, guarded so the role's rating can never be
    /// overwritten. Returns false when the rating was already set.
    pub async fn write_rating(
        &self,
        history_id: HistoryId,
        role: PartyRole,
        rating: u8,
        comment: Option<&str>,
    ) -> Result<bool> {
        let sql = match role {
            PartyRole::Seller => {
                r#"
                UPDATE trade_history SET seller_rating = ?, seller_comment = ?
                WHERE id = ? AND seller_rating IS NULL
                "#
            }
            PartyRole::Buyer => {
                r#"
                UPDATE trade_history SET buyer_rating = ?, buyer_comment = ?
                WHERE id = ? AND buyer_rating IS NULL
                "#
            }
        };

        let result = sqlx::query(sql)
            .bind(rating)
            .bind(comment)
            .bind(history_id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }
}

fn offer_from_row(row: SqliteRow) -> Result<TradeOffer> {
    Ok(TradeOffer {
        id: Uuid::parse_str(&row.get::<String, _>(0))?,
        owner_id: Uuid::parse_str(&row.get::<String, _>(1))?,
        owner_name: row.get(2),
        offering_items: serde_json::from_str(&row.get::<String, _>(3))?,
        requesting_items: serde_json::from_str(&row.get::<String, _>(4))?,
        status: OfferStatus::parse(&row.get::<String, _>(5))?,
        message: row.get(6),
        created_at: row.get(7),
        expires_at: row.get(8),
        completed_at: row.get(9),
        completed_by: row
            .get::<Option<String>, _>(10)
            .map(|s| Uuid::parse_str(&s))
            .transpose()?,
        completed_by_name: row.get(11),
    })
}

fn history_from_row(row: SqliteRow) -> Result<TradeHistory> {
    Ok(TradeHistory {
        id: Uuid::parse_str(&row.get::<String, _>(0))?,
        offer_id: Uuid::parse_str(&row.get::<String, _>(1))?,
        seller_id: Uuid::parse_str(&row.get::<String, _>(2))?,
        buyer_id: Uuid::parse_str(&row.get::<String, _>(3))?,
        offered_items: serde_json::from_str(&row.get::<String, _>(4))?,
        requested_items: serde_json::from_str(&row.get::<String, _>(5))?,
        completed_at: row.get(6),
        seller_rating: row.get(7),
        seller_comment: row.get(8),
        buyer_rating: row.get(9),
        buyer_comment: row.get(10),
    })
}
