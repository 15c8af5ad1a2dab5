use crate::{AccountId, ExchangeError, HistoryId, OfferId, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// A bundle entry: a number of units of one item type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
    pub item_id: String,
    pub quantity: u32,
}

impl ItemStack {
    pub fn new(item_id: impl Into<String>, quantity: u32) -> Self {
        Self {
            item_id: item_id.into(),
            quantity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferStatus {
    Active,
    Completed,
    Cancelled,
    Expired,
}

impl OfferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OfferStatus::Active => "active",
            OfferStatus::Completed => "completed",
            OfferStatus::Cancelled => "cancelled",
            OfferStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(OfferStatus::Active),
            "completed" => Ok(OfferStatus::Completed),
            "cancelled" => Ok(OfferStatus::Cancelled),
            "expired" => Ok(OfferStatus::Expired),
            other => Err(ExchangeError::Serialization(format!(
                "invalid offer status: {other}"
            ))),
        }
    }

    /// `Active` is the sole non-terminal state.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OfferStatus::Active)
    }
}

/// A proposed item-for-item exchange awaiting a counterparty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeOffer {
    pub id: OfferId,
    pub owner_id: AccountId,
    pub owner_name: String,
    pub offering_items: Vec<ItemStack>,
    pub requesting_items: Vec<ItemStack>,
    pub status: OfferStatus,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub completed_by: Option<AccountId>,
    pub completed_by_name: Option<String>,
}

impl TradeOffer {
    pub fn new(
        owner_id: AccountId,
        owner_name: String,
        offering_items: Vec<ItemStack>,
        requesting_items: Vec<ItemStack>,
        message: Option<String>,
        ttl: Duration,
    ) -> Result<Self> {
        validate_items("offering", &offering_items)?;
        validate_items("requesting", &requesting_items)?;
        if ttl <= Duration::zero() {
            return Err(ExchangeError::InvalidOffer(
                "Offer lifetime must be positive".to_string(),
            ));
        }

        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            owner_id,
            owner_name,
            offering_items,
            requesting_items,
            status: OfferStatus::Active,
            message,
            created_at: now,
            expires_at: now + ttl,
            completed_at: None,
            completed_by: None,
            completed_by_name: None,
        })
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

fn validate_items(side: &str, items: &[ItemStack]) -> Result<()> {
    if items.is_empty() {
        return Err(ExchangeError::InvalidOffer(format!(
            "{side} items must not be empty"
        )));
    }
    let mut seen = HashSet::new();
    for stack in items {
        if stack.quantity == 0 {
            return Err(ExchangeError::InvalidOffer(format!(
                "{side} quantity for {} must be greater than 0",
                stack.item_id
            )));
        }
        if !seen.insert(stack.item_id.as_str()) {
            return Err(ExchangeError::InvalidOffer(format!(
                "duplicate {side} item: {}",
                stack.item_id
            )));
        }
    }
    Ok(())
}

/// Which side of a completed trade an account was on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartyRole {
    Seller,
    Buyer,
}

/// Immutable record of a completed trade. The only permitted mutation is
/// the one-time rating write per party.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeHistory {
    pub id: HistoryId,
    pub offer_id: OfferId,
    pub seller_id: AccountId,
    pub buyer_id: AccountId,
    pub offered_items: Vec<ItemStack>,
    pub requested_items: Vec<ItemStack>,
    pub completed_at: DateTime<Utc>,
    pub seller_rating: Option<u8>,
    pub seller_comment: Option<String>,
    pub buyer_rating: Option<u8>,
    pub buyer_comment: Option<String>,
}

impl TradeHistory {
    /// Freeze both item lists of a just-completed offer.
    pub fn snapshot(offer: &TradeOffer, buyer_id: AccountId, completed_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            offer_id: offer.id,
            seller_id: offer.owner_id,
            buyer_id,
            offered_items: offer.offering_items.clone(),
            requested_items: offer.requesting_items.clone(),
            completed_at,
            seller_rating: None,
            seller_comment: None,
            buyer_rating: None,
            buyer_comment: None,
        }
    }

    pub fn role_of(&self, account_id: AccountId) -> Option<PartyRole> {
        if account_id == self.seller_id {
            Some(PartyRole::Seller)
        } else if account_id == self.buyer_id {
            Some(PartyRole::Buyer)
        } else {
            None
        }
    }

    pub fn rating_for(&self, role: PartyRole) -> Option<u8> {
        match role {
            PartyRole::Seller => self.seller_rating,
            PartyRole::Buyer => self.buyer_rating,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stacks(entries: &[(&str, u32)]) -> Vec<ItemStack> {
        entries
            .iter()
            .map(|(id, qty)| ItemStack::new(*id, *qty))
            .collect()
    }

    #[test]
    fn offer_requires_non_empty_item_lists() {
        let result = TradeOffer::new(
            Uuid::new_v4(),
            "Owner".to_string(),
            vec![],
            stacks(&[("iron", 3)]),
            None,
            Duration::hours(1),
        );
        assert!(matches!(result, Err(ExchangeError::InvalidOffer(_))));
    }

    #[test]
    fn offer_rejects_zero_quantities() {
        let result = TradeOffer::new(
            Uuid::new_v4(),
            "Owner".to_string(),
            stacks(&[("wood", 0)]),
            stacks(&[("iron", 3)]),
            None,
            Duration::hours(1),
        );
        assert!(matches!(result, Err(ExchangeError::InvalidOffer(_))));
    }

    #[test]
    fn offer_rejects_duplicate_item_ids() {
        let result = TradeOffer::new(
            Uuid::new_v4(),
            "Owner".to_string(),
            stacks(&[("wood", 5), ("wood", 5)]),
            stacks(&[("iron", 3)]),
            None,
            Duration::hours(1),
        );
        assert!(matches!(result, Err(ExchangeError::InvalidOffer(_))));
    }

    #[test]
    fn offer_rejects_non_positive_ttl() {
        let result = TradeOffer::new(
            Uuid::new_v4(),
            "Owner".to_string(),
            stacks(&[("wood", 10)]),
            stacks(&[("iron", 3)]),
            None,
            Duration::zero(),
        );
        assert!(matches!(result, Err(ExchangeError::InvalidOffer(_))));
    }

    #[test]
    fn new_offer_is_active_and_unexpired() {
        let offer = TradeOffer::new(
            Uuid::new_v4(),
            "Owner".to_string(),
            stacks(&[("wood", 10)]),
            stacks(&[("iron", 3)]),
            Some("swap?".to_string()),
            Duration::hours(1),
        )
        .unwrap();
        assert_eq!(offer.status, OfferStatus::Active);
        assert!(!offer.status.is_terminal());
        assert!(!offer.is_expired());
        assert!(offer.expires_at > offer.created_at);
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            OfferStatus::Active,
            OfferStatus::Completed,
            OfferStatus::Cancelled,
            OfferStatus::Expired,
        ] {
            assert_eq!(OfferStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(OfferStatus::parse("pending").is_err());
    }

    #[test]
    fn history_resolves_party_roles() {
        let offer = TradeOffer::new(
            Uuid::new_v4(),
            "Owner".to_string(),
            stacks(&[("wood", 10)]),
            stacks(&[("iron", 3)]),
            None,
            Duration::hours(1),
        )
        .unwrap();
        let buyer = Uuid::new_v4();
        let history = TradeHistory::snapshot(&offer, buyer, Utc::now());

        assert_eq!(history.role_of(offer.owner_id), Some(PartyRole::Seller));
        assert_eq!(history.role_of(buyer), Some(PartyRole::Buyer));
        assert_eq!(history.role_of(Uuid::new_v4()), None);
        assert_eq!(history.offered_items, offer.offering_items);
        assert_eq!(history.requested_items, offer.requesting_items);
    }
}
