use crate::{HistoryId, OfferId};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ExchangeError>;

#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("Invalid offer: {0}")]
    InvalidOffer(String),

    #[error("Offer not found: {0}")]
    OfferNotFound(OfferId),

    #[error("Offer is no longer available: {0}")]
    OfferUnavailable(OfferId),

    #[error("Offer has expired: {0}")]
    OfferExpired(OfferId),

    #[error("Cannot accept your own offer")]
    SelfAcceptance,

    #[error("Insufficient items: {item} (short by {shortfall})")]
    InsufficientItems { item: String, shortfall: u32 },

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Trade record not found: {0}")]
    HistoryNotFound(HistoryId),

    #[error("This trade has already been rated by you")]
    AlreadyRated,

    #[error("Rating must be between 1 and 5, got {0}")]
    InvalidRating(u8),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ExchangeError {
    /// Stable taxonomy code for the surrounding request layer. Backend
    /// failures collapse to a single opaque code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidOffer(_) => "invalid_offer",
            Self::OfferNotFound(_) => "offer_not_found",
            Self::OfferUnavailable(_) => "offer_unavailable",
            Self::OfferExpired(_) => "offer_expired",
            Self::SelfAcceptance => "self_acceptance",
            Self::InsufficientItems { .. } => "insufficient_items",
            Self::PermissionDenied => "permission_denied",
            Self::HistoryNotFound(_) => "history_not_found",
            Self::AlreadyRated => "already_rated",
            Self::InvalidRating(_) => "invalid_rating",
            Self::Config(_) => "config",
            Self::Database(_) | Self::Serialization(_) => "backend_failure",
        }
    }

    /// Business-rule failures are detected before any mutation and must
    /// never be retried automatically; backend failures imply the enclosing
    /// transaction rolled back and may be retried by the caller.
    pub fn is_business_rule(&self) -> bool {
        !matches!(self, Self::Database(_) | Self::Serialization(_))
    }
}

impl From<serde_json::Error> for ExchangeError {
    fn from(err: serde_json::Error) -> Self {
        ExchangeError::Serialization(err.to_string())
    }
}

impl From<uuid::Error> for ExchangeError {
    fn from(err: uuid::Error) -> Self {
        ExchangeError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_errors_are_not_business_rules() {
        let err = ExchangeError::Database(sqlx::Error::PoolTimedOut);
        assert_eq!(err.code(), "backend_failure");
        assert!(!err.is_business_rule());
    }

    #[test]
    fn insufficient_items_carries_shortfall() {
        let err = ExchangeError::InsufficientItems {
            item: "iron".to_string(),
            shortfall: 1,
        };
        assert_eq!(err.code(), "insufficient_items");
        assert!(err.is_business_rule());
        assert_eq!(err.to_string(), "Insufficient items: iron (short by 1)");
    }
}
