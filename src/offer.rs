use crate::{
    ledger,
    model::{ItemStack, OfferStatus, TradeOffer},
    AccountId, Database, ExchangeError, OfferId, Result,
};
use chrono::{Duration, Utc};

/// Persistence and lifecycle of trade offers.
///
/// Creating an offer escrows the offered items: they are debited from the
/// owner in the same transaction that inserts the offer row. Cancellation
/// and expiry refund them by crediting `offering_items` back, guarded by
/// the status compare-and-set so a refund can never happen twice; accept
/// delivers the escrowed items to the buyer without touching the owner's
/// inventory again.
#[derive(Clone)]
pub struct OfferStore {
    db: Database,
}

impl OfferStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Post a new offer. Fails with `InvalidOffer` on malformed item lists
    /// or a non-positive ttl, and with `InsufficientItems` when the owner
    /// does not hold the offered items; nothing is written on failure.
    pub async fn create(
        &self,
        owner_id: AccountId,
        owner_name: &str,
        offering_items: Vec<ItemStack>,
        requesting_items: Vec<ItemStack>,
        message: Option<String>,
        ttl: Duration,
    ) -> Result<TradeOffer> {
        let offer = TradeOffer::new(
            owner_id,
            owner_name.to_string(),
            offering_items,
            requesting_items,
            message,
            ttl,
        )?;

        let mut tx = self.db.begin().await?;
        for stack in &offer.offering_items {
            ledger::debit(&mut tx, owner_id, &stack.item_id, stack.quantity).await?;
        }
        Database::insert_offer(&mut tx, &offer).await?;
        tx.commit().await?;

        tracing::info!(
            offer_id = %offer.id,
            %owner_id,
            offering = offer.offering_items.len(),
            requesting = offer.requesting_items.len(),
            expires_at = %offer.expires_at,
            "offer created, items escrowed"
        );
        Ok(offer)
    }

    pub async fn get(&self, offer_id: OfferId) -> Result<TradeOffer> {
        self.db
            .get_offer(offer_id)
            .await?
            .ok_or(ExchangeError::OfferNotFound(offer_id))
    }

    /// Active, unexpired offers. Lapsed offers the sweeper has not reached
    /// yet are filtered out here by the read-time expiry check.
    pub async fn list_available(&self) -> Result<Vec<TradeOffer>> {
        self.db.list_available_offers(Utc::now()).await
    }

    /// Cancel an active offer and refund its escrowed items to the owner.
    /// Only the owner may cancel; a second cancel fails with
    /// `OfferUnavailable`.
    pub async fn cancel(&self, offer_id: OfferId, requester_id: AccountId) -> Result<TradeOffer> {
        let mut tx = self.db.begin().await?;

        let offer = Database::fetch_offer(&mut tx, offer_id)
            .await?
            .ok_or(ExchangeError::OfferNotFound(offer_id))?;
        if offer.owner_id != requester_id {
            return Err(ExchangeError::PermissionDenied);
        }
        if offer.status != OfferStatus::Active {
            return Err(ExchangeError::OfferUnavailable(offer_id));
        }

        for stack in &offer.offering_items {
            ledger::credit(&mut tx, offer.owner_id, &stack.item_id, stack.quantity).await?;
        }

        let claimed =
            Database::finalize_offer(&mut tx, offer_id, OfferStatus::Cancelled, None, None, None)
                .await?;
        if !claimed {
            // Dropping the transaction rolls the refund back.
            return Err(ExchangeError::OfferUnavailable(offer_id));
        }

        tx.commit().await?;
        tracing::info!(%offer_id, owner_id = %offer.owner_id, "offer cancelled and refunded");

        Ok(TradeOffer {
            status: OfferStatus::Cancelled,
            ..offer
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InventoryLedger;
    use tempfile::NamedTempFile;
    use uuid::Uuid;

    async fn test_db() -> (Database, NamedTempFile) {
        let temp_file = NamedTempFile::new().unwrap();
        let db_url = format!("sqlite://{}", temp_file.path().to_string_lossy());
        (Database::new(&db_url).await.unwrap(), temp_file)
    }

    fn wood_for_iron() -> (Vec<ItemStack>, Vec<ItemStack>) {
        (
            vec![ItemStack::new("wood", 10)],
            vec![ItemStack::new("iron", 3)],
        )
    }

    #[tokio::test]
    async fn create_escrows_offered_items() {
        let (db, _guard) = test_db().await;
        let store = OfferStore::new(db.clone());
        let inventory = InventoryLedger::new(db);
        let owner = Uuid::new_v4();
        inventory.grant(owner, "wood", 12).await.unwrap();
        let (offering, requesting) = wood_for_iron();

        let offer = store
            .create(
                owner,
                "Owner",
                offering.clone(),
                requesting.clone(),
                Some("swap?".to_string()),
                Duration::hours(1),
            )
            .await
            .unwrap();

        assert_eq!(inventory.balance(owner, "wood").await.unwrap(), 2);

        let loaded = store.get(offer.id).await.unwrap();
        assert_eq!(loaded.owner_id, owner);
        assert_eq!(loaded.offering_items, offering);
        assert_eq!(loaded.requesting_items, requesting);
        assert_eq!(loaded.status, OfferStatus::Active);
        assert_eq!(loaded.message.as_deref(), Some("swap?"));
    }

    #[tokio::test]
    async fn create_fails_without_the_offered_items() {
        let (db, _guard) = test_db().await;
        let store = OfferStore::new(db.clone());
        let inventory = InventoryLedger::new(db);
        let owner = Uuid::new_v4();
        inventory.grant(owner, "wood", 4).await.unwrap();
        let (offering, requesting) = wood_for_iron();

        let err = store
            .create(owner, "Owner", offering, requesting, None, Duration::hours(1))
            .await
            .unwrap_err();
        match err {
            ExchangeError::InsufficientItems { item, shortfall } => {
                assert_eq!(item, "wood");
                assert_eq!(shortfall, 6);
            }
            other => panic!("unexpected error: {other}"),
        }

        // Nothing was escrowed and no offer row exists.
        assert_eq!(inventory.balance(owner, "wood").await.unwrap(), 4);
        assert!(store.list_available().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn get_unknown_offer_fails() {
        let (db, _guard) = test_db().await;
        let store = OfferStore::new(db);
        let result = store.get(Uuid::new_v4()).await;
        assert!(matches!(result, Err(ExchangeError::OfferNotFound(_))));
    }

    #[tokio::test]
    async fn cancel_refunds_owner_once() {
        let (db, _guard) = test_db().await;
        let store = OfferStore::new(db.clone());
        let inventory = InventoryLedger::new(db);
        let owner = Uuid::new_v4();
        inventory.grant(owner, "wood", 10).await.unwrap();
        let (offering, requesting) = wood_for_iron();

        let offer = store
            .create(owner, "Owner", offering, requesting, None, Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(inventory.balance(owner, "wood").await.unwrap(), 0);

        let cancelled = store.cancel(offer.id, owner).await.unwrap();
        assert_eq!(cancelled.status, OfferStatus::Cancelled);
        assert_eq!(inventory.balance(owner, "wood").await.unwrap(), 10);

        // Second cancel must not refund again.
        let result = store.cancel(offer.id, owner).await;
        assert!(matches!(result, Err(ExchangeError::OfferUnavailable(_))));
        assert_eq!(inventory.balance(owner, "wood").await.unwrap(), 10);
    }

    #[tokio::test]
    async fn only_owner_may_cancel() {
        let (db, _guard) = test_db().await;
        let store = OfferStore::new(db.clone());
        let inventory = InventoryLedger::new(db);
        let owner = Uuid::new_v4();
        inventory.grant(owner, "wood", 10).await.unwrap();
        let (offering, requesting) = wood_for_iron();

        let offer = store
            .create(owner, "Owner", offering, requesting, None, Duration::hours(1))
            .await
            .unwrap();

        let result = store.cancel(offer.id, Uuid::new_v4()).await;
        assert!(matches!(result, Err(ExchangeError::PermissionDenied)));

        let loaded = store.get(offer.id).await.unwrap();
        assert_eq!(loaded.status, OfferStatus::Active);
        // Items stay escrowed.
        assert_eq!(inventory.balance(owner, "wood").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn list_available_filters_lapsed_offers() {
        let (db, _guard) = test_db().await;
        let store = OfferStore::new(db.clone());
        let inventory = InventoryLedger::new(db);
        let owner = Uuid::new_v4();
        inventory.grant(owner, "wood", 20).await.unwrap();
        let (offering, requesting) = wood_for_iron();

        let live = store
            .create(
                owner,
                "Owner",
                offering.clone(),
                requesting.clone(),
                None,
                Duration::hours(1),
            )
            .await
            .unwrap();
        let lapsed = store
            .create(
                owner,
                "Owner",
                offering,
                requesting,
                None,
                Duration::milliseconds(1),
            )
            .await
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let available = store.list_available().await.unwrap();
        let ids: Vec<_> = available.iter().map(|o| o.id).collect();
        assert!(ids.contains(&live.id));
        // Still active in the store, but the read-time expiry check hides it.
        assert!(!ids.contains(&lapsed.id));
        assert_eq!(store.get(lapsed.id).await.unwrap().status, OfferStatus::Active);
    }
}
