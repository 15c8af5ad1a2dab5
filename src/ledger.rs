//! Inventory Ledger: per-account, per-item balance store.
//!
//! A missing row is equivalent to quantity 0. Rows are mutated only through
//! [`debit`] and [`credit`]; both take the caller's open connection so the
//! read-modify-write runs inside whatever transaction encloses it.

use crate::{model::ItemStack, AccountId, Database, ExchangeError, Result};
use sqlx::{Row, SqliteConnection};

/// Current balance of one `(account, item)` row inside the caller's
/// transaction. Missing row reads as 0.
pub async fn balance(
    conn: &mut SqliteConnection,
    account_id: AccountId,
    item_id: &str,
) -> Result<u32> {
    let row = sqlx::query(
        r#"
        SELECT quantity FROM inventory WHERE account_id = ? AND item_id = ?
        "#,
    )
    .bind(account_id.to_string())
    .bind(item_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.map(|r| r.get::<u32, _>(0)).unwrap_or(0))
}

/// Remove `quantity` units from an account. Fails with `InsufficientItems`
/// carrying the exact shortfall, writing nothing. A row drained to 0 is
/// deleted.
pub async fn debit(
    conn: &mut SqliteConnection,
    account_id: AccountId,
    item_id: &str,
    quantity: u32,
) -> Result<u32> {
    let current = balance(&mut *conn, account_id, item_id).await?;
    if current < quantity {
        return Err(ExchangeError::InsufficientItems {
            item: item_id.to_string(),
            shortfall: quantity - current,
        });
    }

    let remaining = current - quantity;
    if remaining == 0 {
        sqlx::query(
            r#"
            DELETE FROM inventory WHERE account_id = ? AND item_id = ?
            "#,
        )
        .bind(account_id.to_string())
        .bind(item_id)
        .execute(&mut *conn)
        .await?;
    } else {
        sqlx::query(
            r#"
            UPDATE inventory SET quantity = ? WHERE account_id = ? AND item_id = ?
            "#,
        )
        .bind(remaining)
        .bind(account_id.to_string())
        .bind(item_id)
        .execute(&mut *conn)
        .await?;
    }

    Ok(remaining)
}

/// Add `quantity` units to an account, creating the row if absent.
pub async fn credit(
    conn: &mut SqliteConnection,
    account_id: AccountId,
    item_id: &str,
    quantity: u32,
) -> Result<u32> {
    sqlx::query(
        r#"
        INSERT INTO inventory (account_id, item_id, quantity) VALUES (?, ?, ?)
        ON CONFLICT (account_id, item_id) DO UPDATE SET quantity = quantity + excluded.quantity
        "#,
    )
    .bind(account_id.to_string())
    .bind(item_id)
    .bind(quantity)
    .execute(&mut *conn)
    .await?;

    balance(conn, account_id, item_id).await
}

/// Pool-backed handle for callers outside a trade transaction: account
/// provisioning and display reads. Display reads must never feed an
/// accept/cancel decision; those re-read inside their own transaction.
#[derive(Clone)]
pub struct InventoryLedger {
    db: Database,
}

impl InventoryLedger {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Credit items to an account outside any trade, e.g. initial stock.
    pub async fn grant(&self, account_id: AccountId, item_id: &str, quantity: u32) -> Result<u32> {
        let mut conn = self.db.pool().acquire().await?;
        let new_balance = credit(&mut conn, account_id, item_id, quantity).await?;
        tracing::debug!(%account_id, item_id, quantity, new_balance, "granted items");
        Ok(new_balance)
    }

    pub async fn balance(&self, account_id: AccountId, item_id: &str) -> Result<u32> {
        let mut conn = self.db.pool().acquire().await?;
        balance(&mut conn, account_id, item_id).await
    }

    /// All non-zero balances of an account, ordered by item id.
    pub async fn balances(&self, account_id: AccountId) -> Result<Vec<ItemStack>> {
        let rows = sqlx::query(
            r#"
            SELECT item_id, quantity FROM inventory WHERE account_id = ?
            ORDER BY item_id ASC
            "#,
        )
        .bind(account_id.to_string())
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows
            .iter()
            .map(|row| ItemStack::new(row.get::<String, _>(0), row.get::<u32, _>(1)))
            .collect())
    }
}
