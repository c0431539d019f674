//! In-memory deal store.
//!
//! Each deal lives in a slot with its committed state and a writer mutex.
//! A transaction takes the writer mutex, stages its writes on a private copy
//! and publishes the copy on commit, so readers only ever observe committed
//! state and concurrent transactions on one deal run one after another.
//!
//! Every operation yields to the scheduler once, standing in for the network
//! round-trip of a real database so concurrent joins actually interleave.

use super::{DealStore, DealTransaction, RepoResult};
use crate::error::RepositoryError;
use crate::models::{Deal, DealFilter, DealPage, DealSort, DealStatus, GroupBuyParticipant, PriceHistory, SortOrder};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

/// Write steps where a failure can be injected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    InsertParticipant,
    IncrementParticipants,
    ApplyPrice,
    RepriceParticipants,
    AppendHistory,
    Commit,
}

#[derive(Debug, Clone, Copy)]
struct Fault {
    remaining: u32,
    transient: bool,
}

/// Committed aggregate of one deal
#[derive(Debug, Clone)]
struct DealRecord {
    deal: Deal,
    participants: Vec<GroupBuyParticipant>,
    history: Vec<PriceHistory>,
}

#[derive(Debug)]
struct DealSlot {
    writer: Arc<tokio::sync::Mutex<()>>,
    committed: RwLock<DealRecord>,
}

#[derive(Debug, Default)]
struct Shared {
    deals: RwLock<HashMap<Uuid, Arc<DealSlot>>>,
    faults: Mutex<HashMap<FaultPoint, Fault>>,
}

impl Shared {
    fn slot(&self, deal_id: Uuid) -> RepoResult<Option<Arc<DealSlot>>> {
        let deals = self.deals.read().map_err(|_| lock_error())?;
        Ok(deals.get(&deal_id).cloned())
    }

    /// Consume one armed failure at `point`, if any
    fn trip(&self, point: FaultPoint) -> RepoResult<()> {
        let mut faults = self.faults.lock().map_err(|_| lock_error())?;
        let Some(fault) = faults.get_mut(&point) else {
            return Ok(());
        };

        fault.remaining = fault.remaining.saturating_sub(1);
        let transient = fault.transient;
        if fault.remaining == 0 {
            faults.remove(&point);
        }

        let message = format!("injected failure at {:?}", point);
        if transient {
            Err(RepositoryError::Transient(message))
        } else {
            Err(RepositoryError::Storage(message))
        }
    }
}

fn lock_error() -> RepositoryError {
    RepositoryError::Storage("in-memory store lock poisoned".to_string())
}

fn read_record(slot: &DealSlot) -> RepoResult<DealRecord> {
    slot.committed
        .read()
        .map(|record| record.clone())
        .map_err(|_| lock_error())
}

/// Thread-safe in-memory store for tests and local runs
#[derive(Debug, Clone, Default)]
pub struct MemoryDealStore {
    shared: Arc<Shared>,
}

impl MemoryDealStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a deal as-is, bypassing creation rules
    pub fn insert_deal(&self, deal: Deal) -> RepoResult<()> {
        let mut deals = self.shared.deals.write().map_err(|_| lock_error())?;
        deals.insert(
            deal.id,
            Arc::new(DealSlot {
                writer: Arc::new(tokio::sync::Mutex::new(())),
                committed: RwLock::new(DealRecord {
                    deal,
                    participants: Vec::new(),
                    history: Vec::new(),
                }),
            }),
        );
        Ok(())
    }

    /// Fail the next `times` writes at `point` with a non-retryable error
    pub fn fail_at(&self, point: FaultPoint, times: u32) {
        self.arm(point, times, false);
    }

    /// Fail the next `times` writes at `point` with a retryable error
    pub fn fail_transiently_at(&self, point: FaultPoint, times: u32) {
        self.arm(point, times, true);
    }

    fn arm(&self, point: FaultPoint, times: u32, transient: bool) {
        if times == 0 {
            return;
        }
        if let Ok(mut faults) = self.shared.faults.lock() {
            faults.insert(point, Fault { remaining: times, transient });
        }
    }
}

fn compare_deals(filter: &DealFilter, a: &Deal, b: &Deal) -> std::cmp::Ordering {
    let primary = match filter.sort_by {
        DealSort::CreatedAt => a.created_at.cmp(&b.created_at),
        DealSort::Price => a.current_price.cmp(&b.current_price),
        DealSort::Discount => a.discount.cmp(&b.discount),
        // Open-ended deals sort last regardless of direction
        DealSort::Ending => {
            return match (a.end_date, b.end_date) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => b.created_at.cmp(&a.created_at),
            };
        }
    };
    let primary = match filter.sort_order {
        SortOrder::Asc => primary,
        SortOrder::Desc => primary.reverse(),
    };
    primary.then_with(|| b.created_at.cmp(&a.created_at))
}

#[async_trait]
impl DealStore for MemoryDealStore {
    async fn create_deal(&self, deal: &Deal) -> RepoResult<Deal> {
        tokio::task::yield_now().await;
        if self.shared.slot(deal.id)?.is_some() {
            return Err(RepositoryError::Duplicate(format!("deal {} already exists", deal.id)));
        }
        self.insert_deal(deal.clone())?;
        Ok(deal.clone())
    }

    async fn find_deal(&self, deal_id: Uuid) -> RepoResult<Option<Deal>> {
        tokio::task::yield_now().await;
        match self.shared.slot(deal_id)? {
            Some(slot) => Ok(Some(read_record(&slot)?.deal)),
            None => Ok(None),
        }
    }

    async fn list_deals(&self, filter: &DealFilter, now: DateTime<Utc>) -> RepoResult<DealPage> {
        tokio::task::yield_now().await;
        let slots: Vec<Arc<DealSlot>> = {
            let deals = self.shared.deals.read().map_err(|_| lock_error())?;
            deals.values().cloned().collect()
        };

        let mut matching = Vec::new();
        for slot in slots {
            let deal = read_record(&slot)?.deal;
            if filter.matches(&deal, now) {
                matching.push(deal);
            }
        }
        matching.sort_by(|a, b| compare_deals(filter, a, b));

        let total = matching.len() as u64;
        let deals = matching
            .into_iter()
            .skip(filter.offset() as usize)
            .take(filter.limit as usize)
            .collect();

        Ok(DealPage { deals, total })
    }

    async fn update_deal_status(
        &self,
        deal_id: Uuid,
        from: DealStatus,
        to: DealStatus,
    ) -> RepoResult<Option<Deal>> {
        tokio::task::yield_now().await;
        let Some(slot) = self.shared.slot(deal_id)? else {
            return Ok(None);
        };

        let _writer = slot.writer.lock().await;
        let mut record = slot.committed.write().map_err(|_| lock_error())?;
        if record.deal.status != from {
            return Ok(None);
        }
        record.deal.status = to;
        record.deal.updated_at = Utc::now();
        Ok(Some(record.deal.clone()))
    }

    async fn find_participants(&self, deal_id: Uuid) -> RepoResult<Vec<GroupBuyParticipant>> {
        tokio::task::yield_now().await;
        let Some(slot) = self.shared.slot(deal_id)? else {
            return Ok(Vec::new());
        };
        let mut participants = read_record(&slot)?.participants;
        participants.sort_by(|a, b| b.joined_at.cmp(&a.joined_at));
        Ok(participants)
    }

    async fn count_participants(&self, deal_id: Uuid) -> RepoResult<i64> {
        tokio::task::yield_now().await;
        let Some(slot) = self.shared.slot(deal_id)? else {
            return Ok(0);
        };
        Ok(read_record(&slot)?.participants.len() as i64)
    }

    async fn price_history(&self, deal_id: Uuid) -> RepoResult<Vec<PriceHistory>> {
        tokio::task::yield_now().await;
        let Some(slot) = self.shared.slot(deal_id)? else {
            return Ok(Vec::new());
        };
        let mut history = read_record(&slot)?.history;
        history.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then(a.participants.cmp(&b.participants))
        });
        Ok(history)
    }

    async fn begin(&self) -> RepoResult<Box<dyn DealTransaction>> {
        Ok(Box::new(MemoryDealTransaction {
            shared: Arc::clone(&self.shared),
            locked: None,
        }))
    }
}

struct LockedDeal {
    slot: Arc<DealSlot>,
    _writer: OwnedMutexGuard<()>,
    working: DealRecord,
}

/// Staged writes against one locked deal
pub struct MemoryDealTransaction {
    shared: Arc<Shared>,
    locked: Option<LockedDeal>,
}

impl MemoryDealTransaction {
    fn working(&mut self, deal_id: Uuid) -> RepoResult<&mut DealRecord> {
        match self.locked.as_mut() {
            Some(locked) if locked.working.deal.id == deal_id => Ok(&mut locked.working),
            Some(_) => Err(RepositoryError::Storage(format!(
                "transaction holds a different deal than {}",
                deal_id
            ))),
            None => Err(RepositoryError::Storage(format!(
                "deal {} must be locked before writing",
                deal_id
            ))),
        }
    }
}

#[async_trait]
impl DealTransaction for MemoryDealTransaction {
    async fn lock_deal(&mut self, deal_id: Uuid) -> RepoResult<Option<Deal>> {
        if let Some(locked) = &self.locked {
            if locked.working.deal.id == deal_id {
                return Ok(Some(locked.working.deal.clone()));
            }
            return Err(RepositoryError::Storage(
                "transaction already holds another deal".to_string(),
            ));
        }

        tokio::task::yield_now().await;
        let Some(slot) = self.shared.slot(deal_id)? else {
            return Ok(None);
        };

        let writer = Arc::clone(&slot.writer).lock_owned().await;
        let working = read_record(&slot)?;
        let deal = working.deal.clone();
        self.locked = Some(LockedDeal {
            slot,
            _writer: writer,
            working,
        });
        Ok(Some(deal))
    }

    async fn find_participant(
        &mut self,
        deal_id: Uuid,
        user_id: Uuid,
    ) -> RepoResult<Option<GroupBuyParticipant>> {
        tokio::task::yield_now().await;
        let record = self.working(deal_id)?;
        Ok(record
            .participants
            .iter()
            .find(|p| p.user_id == user_id)
            .cloned())
    }

    async fn insert_participant(&mut self, participant: &GroupBuyParticipant) -> RepoResult<()> {
        tokio::task::yield_now().await;
        self.shared.trip(FaultPoint::InsertParticipant)?;
        let record = self.working(participant.deal_id)?;
        if record
            .participants
            .iter()
            .any(|p| p.user_id == participant.user_id)
        {
            return Err(RepositoryError::Duplicate(format!(
                "participant ({}, {}) already exists",
                participant.user_id, participant.deal_id
            )));
        }
        record.participants.push(participant.clone());
        Ok(())
    }

    async fn increment_participants(&mut self, deal_id: Uuid) -> RepoResult<Deal> {
        tokio::task::yield_now().await;
        self.shared.trip(FaultPoint::IncrementParticipants)?;
        let record = self.working(deal_id)?;
        record.deal.current_participants += 1;
        record.deal.updated_at = Utc::now();
        Ok(record.deal.clone())
    }

    async fn break_already_applied(&mut self, deal_id: Uuid, target: i32) -> RepoResult<bool> {
        tokio::task::yield_now().await;
        let record = self.working(deal_id)?;
        Ok(record.history.iter().any(|h| h.participants >= target))
    }

    async fn apply_price(
        &mut self,
        deal_id: Uuid,
        price: Decimal,
        discount: i32,
    ) -> RepoResult<Deal> {
        tokio::task::yield_now().await;
        self.shared.trip(FaultPoint::ApplyPrice)?;
        let record = self.working(deal_id)?;
        if price <= Decimal::ZERO || price > record.deal.original_price {
            return Err(RepositoryError::ConstraintViolation(format!(
                "price {} violates 0 < price <= {}",
                price, record.deal.original_price
            )));
        }
        record.deal.current_price = price;
        record.deal.discount = discount;
        record.deal.updated_at = Utc::now();
        Ok(record.deal.clone())
    }

    async fn reprice_active_participants(
        &mut self,
        deal_id: Uuid,
        price: Decimal,
    ) -> RepoResult<u64> {
        tokio::task::yield_now().await;
        self.shared.trip(FaultPoint::RepriceParticipants)?;
        let record = self.working(deal_id)?;
        let mut changed = 0;
        for participant in record.participants.iter_mut().filter(|p| p.is_active()) {
            participant.current_price = price;
            changed += 1;
        }
        Ok(changed)
    }

    async fn append_price_history(&mut self, entry: &PriceHistory) -> RepoResult<()> {
        tokio::task::yield_now().await;
        self.shared.trip(FaultPoint::AppendHistory)?;
        let record = self.working(entry.deal_id)?;
        record.history.push(entry.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> RepoResult<()> {
        tokio::task::yield_now().await;
        self.shared.trip(FaultPoint::Commit)?;
        let MemoryDealTransaction { locked, .. } = *self;
        if let Some(locked) = locked {
            let mut committed = locked.slot.committed.write().map_err(|_| lock_error())?;
            *committed = locked.working;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DealType, NewDeal};

    fn group_buy(target: i32) -> Deal {
        NewDeal {
            merchant_id: Uuid::new_v4(),
            title: "Noise-cancelling headphones".into(),
            description: "Over-ear".into(),
            category: "audio".into(),
            deal_type: DealType::GroupBuy,
            original_price: Decimal::new(1000, 0),
            current_price: Decimal::new(1000, 0),
            target_participants: Some(target),
            cashback_amount: None,
            cashback_percentage: None,
            end_date: None,
        }
        .into_deal(0, Utc::now())
    }

    #[tokio::test]
    async fn test_uncommitted_writes_are_discarded() {
        let store = MemoryDealStore::new();
        let deal = group_buy(2);
        store.insert_deal(deal.clone()).unwrap();

        {
            let mut tx = store.begin().await.unwrap();
            tx.lock_deal(deal.id).await.unwrap().unwrap();
            let p = GroupBuyParticipant::new(Uuid::new_v4(), deal.id, 1, deal.current_price);
            tx.insert_participant(&p).await.unwrap();
            tx.increment_participants(deal.id).await.unwrap();
            // dropped without commit
        }

        let stored = store.find_deal(deal.id).await.unwrap().unwrap();
        assert_eq!(stored.current_participants, 0);
        assert_eq!(store.count_participants(deal.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_commit_publishes_writes() {
        let store = MemoryDealStore::new();
        let deal = group_buy(2);
        store.insert_deal(deal.clone()).unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.lock_deal(deal.id).await.unwrap().unwrap();
        let p = GroupBuyParticipant::new(Uuid::new_v4(), deal.id, 1, deal.current_price);
        tx.insert_participant(&p).await.unwrap();
        tx.increment_participants(deal.id).await.unwrap();
        tx.commit().await.unwrap();

        let stored = store.find_deal(deal.id).await.unwrap().unwrap();
        assert_eq!(stored.current_participants, 1);
        assert_eq!(store.count_participants(deal.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_participant_rejected() {
        let store = MemoryDealStore::new();
        let deal = group_buy(5);
        store.insert_deal(deal.clone()).unwrap();
        let user = Uuid::new_v4();

        let mut tx = store.begin().await.unwrap();
        tx.lock_deal(deal.id).await.unwrap();
        tx.insert_participant(&GroupBuyParticipant::new(user, deal.id, 1, deal.current_price))
            .await
            .unwrap();
        let err = tx
            .insert_participant(&GroupBuyParticipant::new(user, deal.id, 3, deal.current_price))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Duplicate(_)));
    }

    #[tokio::test]
    async fn test_writes_require_lock() {
        let store = MemoryDealStore::new();
        let deal = group_buy(2);
        store.insert_deal(deal.clone()).unwrap();

        let mut tx = store.begin().await.unwrap();
        assert!(tx.increment_participants(deal.id).await.is_err());
    }

    #[tokio::test]
    async fn test_injected_fault_fires_once() {
        let store = MemoryDealStore::new();
        let deal = group_buy(2);
        store.insert_deal(deal.clone()).unwrap();
        store.fail_transiently_at(FaultPoint::IncrementParticipants, 1);

        let mut tx = store.begin().await.unwrap();
        tx.lock_deal(deal.id).await.unwrap();
        let err = tx.increment_participants(deal.id).await.unwrap_err();
        assert!(err.is_transient());
        assert!(tx.increment_participants(deal.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_status_compare_and_set() {
        let store = MemoryDealStore::new();
        let deal = group_buy(2);
        store.insert_deal(deal.clone()).unwrap();

        let moved = store
            .update_deal_status(deal.id, DealStatus::Draft, DealStatus::Active)
            .await
            .unwrap();
        assert_eq!(moved.unwrap().status, DealStatus::Active);

        let stale = store
            .update_deal_status(deal.id, DealStatus::Draft, DealStatus::Cancelled)
            .await
            .unwrap();
        assert!(stale.is_none());
    }
}
