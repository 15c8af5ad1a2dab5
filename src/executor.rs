//! Exchange Executor: the atomic accept operation.
//!
//! Everything between reading the offer row and inserting the history
//! record runs in one transaction. Business-rule checks happen before any
//! mutation, so a failed accept leaves both parties' inventories exactly as
//! they were; any later error rolls the whole unit back.

use crate::{
    ledger,
    model::{ItemStack, OfferStatus, TradeHistory},
    AccountId, Database, ExchangeError, HistoryId, OfferId, Result,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Outcome of a successful accept, for the surrounding request layer.
#[derive(Debug, Clone, Serialize)]
pub struct AcceptReceipt {
    pub offer_id: OfferId,
    pub history_id: HistoryId,
    pub completed_at: DateTime<Utc>,
    pub message: String,
}

#[derive(Clone)]
pub struct ExchangeExecutor {
    db: Database,
}

impl ExchangeExecutor {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Accept an offer on behalf of `buyer_id`.
    ///
    /// Concurrent accepts of the same offer are serialized by the storage
    /// layer; the status compare-and-set makes the first committer win, so
    /// every other caller fails with `OfferUnavailable` and no mutation.
    pub async fn accept(
        &self,
        offer_id: OfferId,
        buyer_id: AccountId,
        buyer_name: &str,
    ) -> Result<AcceptReceipt> {
        let mut tx = self.db.begin().await?;

        let offer = Database::fetch_offer(&mut tx, offer_id)
            .await?
            .ok_or(ExchangeError::OfferNotFound(offer_id))?;

        let now = Utc::now();
        if offer.status != OfferStatus::Active {
            return Err(ExchangeError::OfferUnavailable(offer_id));
        }
        if offer.expires_at <= now {
            return Err(ExchangeError::OfferExpired(offer_id));
        }
        if offer.owner_id == buyer_id {
            return Err(ExchangeError::SelfAcceptance);
        }

        // Pre-check every requested balance before touching anything, so a
        // shortfall is reported with no partial state change. Item-id order
        // keeps lock acquisition deterministic.
        let requested = sorted_by_item(&offer.requesting_items);
        for stack in &requested {
            let have = ledger::balance(&mut tx, buyer_id, &stack.item_id).await?;
            if have < stack.quantity {
                return Err(ExchangeError::InsufficientItems {
                    item: stack.item_id.clone(),
                    shortfall: stack.quantity - have,
                });
            }
        }

        for stack in &requested {
            ledger::debit(&mut tx, buyer_id, &stack.item_id, stack.quantity).await?;
        }
        for stack in sorted_by_item(&offer.offering_items).iter() {
            ledger::credit(&mut tx, buyer_id, &stack.item_id, stack.quantity).await?;
        }
        for stack in &requested {
            ledger::credit(&mut tx, offer.owner_id, &stack.item_id, stack.quantity).await?;
        }

        let claimed = Database::finalize_offer(
            &mut tx,
            offer_id,
            OfferStatus::Completed,
            Some(now),
            Some(buyer_id),
            Some(buyer_name),
        )
        .await?;
        if !claimed {
            // Lost the race: another transaction finalized this offer
            // between our read and the flip. Dropping the transaction rolls
            // every ledger write back.
            return Err(ExchangeError::OfferUnavailable(offer_id));
        }

        let history = TradeHistory::snapshot(&offer, buyer_id, now);
        Database::insert_history(&mut tx, &history).await?;

        tx.commit().await?;

        tracing::info!(
            %offer_id,
            %buyer_id,
            owner_id = %offer.owner_id,
            history_id = %history.id,
            "trade completed"
        );

        Ok(AcceptReceipt {
            offer_id,
            history_id: history.id,
            completed_at: now,
            message: format!("Trade completed with {}", offer.owner_name),
        })
    }
}

fn sorted_by_item(items: &[ItemStack]) -> Vec<ItemStack> {
    let mut sorted = items.to_vec();
    sorted.sort_by(|a, b| a.item_id.cmp(&b.item_id));
    sorted
}
