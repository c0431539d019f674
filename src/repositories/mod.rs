//! Persistence seam for deals, participants and the price-history trail.
//!
//! Reads go straight through [`DealStore`]. Every mutation of a deal's group
//! buy runs inside a [`DealTransaction`] that holds an exclusive lock on the
//! deal until it is committed or dropped. Dropping without `commit` discards
//! every staged write.

pub mod deal_repository;
pub mod memory;

pub use deal_repository::PgDealStore;
pub use memory::{FaultPoint, MemoryDealStore};

use crate::error::RepositoryError;
use crate::models::{Deal, DealFilter, DealPage, DealStatus, GroupBuyParticipant, PriceHistory};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

pub type RepoResult<T> = Result<T, RepositoryError>;

#[async_trait]
pub trait DealStore: Send + Sync {
    /// Persist a new deal
    async fn create_deal(&self, deal: &Deal) -> RepoResult<Deal>;

    async fn find_deal(&self, deal_id: Uuid) -> RepoResult<Option<Deal>>;

    /// Listed (active, unexpired) deals matching `filter`, one page
    async fn list_deals(&self, filter: &DealFilter, now: DateTime<Utc>) -> RepoResult<DealPage>;

    /// Compare-and-set the status; `None` when the deal is gone or moved on
    async fn update_deal_status(
        &self,
        deal_id: Uuid,
        from: DealStatus,
        to: DealStatus,
    ) -> RepoResult<Option<Deal>>;

    /// Participants of a deal, most recent first
    async fn find_participants(&self, deal_id: Uuid) -> RepoResult<Vec<GroupBuyParticipant>>;

    async fn count_participants(&self, deal_id: Uuid) -> RepoResult<i64>;

    /// Price-history entries ordered by timestamp ascending
    async fn price_history(&self, deal_id: Uuid) -> RepoResult<Vec<PriceHistory>>;

    /// Open a unit of work
    async fn begin(&self) -> RepoResult<Box<dyn DealTransaction>>;
}

/// A unit of work against a single deal aggregate
#[async_trait]
pub trait DealTransaction: Send {
    /// Lock the deal row for the rest of the transaction
    async fn lock_deal(&mut self, deal_id: Uuid) -> RepoResult<Option<Deal>>;

    async fn find_participant(
        &mut self,
        deal_id: Uuid,
        user_id: Uuid,
    ) -> RepoResult<Option<GroupBuyParticipant>>;

    /// Fails with `Duplicate` when the user already participates
    async fn insert_participant(&mut self, participant: &GroupBuyParticipant) -> RepoResult<()>;

    /// Add one participant to the deal's counter and return the updated deal
    async fn increment_participants(&mut self, deal_id: Uuid) -> RepoResult<Deal>;

    /// Whether the trail already holds a break at or past `target`
    async fn break_already_applied(&mut self, deal_id: Uuid, target: i32) -> RepoResult<bool>;

    /// Set the deal's live price and cached discount
    async fn apply_price(&mut self, deal_id: Uuid, price: Decimal, discount: i32)
        -> RepoResult<Deal>;

    /// Move every active participant to `price`, returning how many changed
    async fn reprice_active_participants(&mut self, deal_id: Uuid, price: Decimal)
        -> RepoResult<u64>;

    async fn append_price_history(&mut self, entry: &PriceHistory) -> RepoResult<()>;

    async fn commit(self: Box<Self>) -> RepoResult<()>;
}
