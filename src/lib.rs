//! # tradepost - Atomic peer-to-peer item trade engine
//!
//! Two account holders swap bundles of inventory items with all-or-nothing
//! consistency under concurrent access.
//!
//! ## Architecture
//!
//! - **Offer Store**: trade offer lifecycle - create, cancel, list
//! - **Inventory Ledger**: per-account, per-item balance store with atomic
//!   debit/credit primitives
//! - **Exchange Executor**: the atomic accept operation - validates, moves
//!   items between both parties and finalizes the offer in one transaction
//! - **Expiration Sweeper**: reconciliation pass that refunds and retires
//!   lapsed offers
//! - **History Recorder**: immutable record of completed trades plus a
//!   one-time-per-party rating
//!
//! Serialization of conflicting operations is delegated to the storage
//! layer (single-writer SQLite pool) combined with compare-and-set status
//! transitions, so concurrent accepts of the same offer produce exactly one
//! success.

pub mod config;
pub mod database;
pub mod error;
pub mod executor;
pub mod history;
pub mod ledger;
pub mod model;
pub mod offer;
pub mod sweeper;

pub use config::AppConfig;
pub use database::Database;
pub use error::{ExchangeError, Result};
pub use executor::{AcceptReceipt, ExchangeExecutor};
pub use history::HistoryRecorder;
pub use ledger::InventoryLedger;
pub use model::{ItemStack, OfferStatus, PartyRole, TradeHistory, TradeOffer};
pub use offer::OfferStore;
pub use sweeper::ExpirationSweeper;

pub type AccountId = uuid::Uuid;
pub type OfferId = uuid::Uuid;
pub type HistoryId = uuid::Uuid;
