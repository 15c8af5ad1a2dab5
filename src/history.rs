use crate::{
    model::TradeHistory,
    AccountId, Database, ExchangeError, HistoryId, Result,
};

/// Read access to completed trades plus the one-time-per-party rating.
#[derive(Clone)]
pub struct HistoryRecorder {
    db: Database,
}

impl HistoryRecorder {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn get(&self, history_id: HistoryId) -> Result<TradeHistory> {
        self.db
            .get_history(history_id)
            .await?
            .ok_or(ExchangeError::HistoryNotFound(history_id))
    }

    /// All trades an account took part in, newest first.
    pub async fn list_for_account(&self, account_id: AccountId) -> Result<Vec<TradeHistory>> {
        self.db.list_history_for_account(account_id).await
    }

    /// Rate the counterparty of a completed trade. The rater's role is
    /// determined by matching against the recorded seller and buyer ids;
    /// each role may rate exactly once.
    pub async fn rate(
        &self,
        history_id: HistoryId,
        rater_id: AccountId,
        rating: u8,
        comment: Option<String>,
    ) -> Result<()> {
        if !(1..=5).contains(&rating) {
            return Err(ExchangeError::InvalidRating(rating));
        }

        let history = self.get(history_id).await?;
        let role = history
            .role_of(rater_id)
            .ok_or(ExchangeError::PermissionDenied)?;
        if history.rating_for(role).is_some() {
            return Err(ExchangeError::AlreadyRated);
        }

        // The write itself is guarded again, so two racing ratings for the
        // same role still produce exactly one winner.
        let written = self
            .db
            .write_rating(history_id, role, rating, comment.as_deref())
            .await?;
        if !written {
            return Err(ExchangeError::AlreadyRated);
        }

        tracing::info!(%history_id, %rater_id, rating, ?role, "trade rated");
        Ok(())
    }
}
