//! Expiration Sweeper: reconciliation pass that refunds and retires offers
//! whose deadline has passed.

use crate::{
    ledger,
    model::OfferStatus,
    Database, OfferId, Result,
};
use chrono::Utc;

/// Scans for `active` offers past `expires_at`, refunds each owner and
/// flips the offer to `expired`.
///
/// Safe to run repeatedly and concurrently with accepts: each offer is
/// processed in its own transaction under the same compare-and-set
/// discipline as accept, so whichever transaction commits first wins and
/// the refund can never be paid twice.
#[derive(Clone)]
pub struct ExpirationSweeper {
    db: Database,
}

impl ExpirationSweeper {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Run one pass. Returns the number of offers expired. A failure on one
    /// offer is logged and does not stop the rest of the pass.
    pub async fn sweep(&self) -> Result<usize> {
        let lapsed = self.db.lapsed_offer_ids(Utc::now()).await?;
        if lapsed.is_empty() {
            return Ok(0);
        }

        let mut expired = 0;
        for offer_id in lapsed {
            match self.expire_one(offer_id).await {
                Ok(true) => expired += 1,
                // Concurrently accepted, cancelled or already swept.
                Ok(false) => {}
                Err(err) => {
                    tracing::warn!(%offer_id, error = %err, "failed to expire offer");
                }
            }
        }

        tracing::info!(expired, "expiration sweep finished");
        Ok(expired)
    }

    async fn expire_one(&self, offer_id: OfferId) -> Result<bool> {
        let mut tx = self.db.begin().await?;

        let offer = match Database::fetch_offer(&mut tx, offer_id).await? {
            Some(offer) if offer.status == OfferStatus::Active => offer,
            _ => return Ok(false),
        };
        // Re-check under the transaction; the selection read may be stale.
        if offer.expires_at > Utc::now() {
            return Ok(false);
        }

        for stack in &offer.offering_items {
            ledger::credit(&mut tx, offer.owner_id, &stack.item_id, stack.quantity).await?;
        }

        let claimed =
            Database::finalize_offer(&mut tx, offer_id, OfferStatus::Expired, None, None, None)
                .await?;
        if !claimed {
            return Ok(false);
        }

        tx.commit().await?;
        tracing::info!(%offer_id, owner_id = %offer.owner_id, "offer expired and refunded");
        Ok(true)
    }
}
