use crate::error::{AppError, AppResult};
use crate::models::{
    Deal, DealFilter, DealPage, DealStatus, DealType, GroupBuyParticipant, NewDeal, PriceHistory,
};
use crate::pricing::{discount_percent, validate_prices};
use crate::repositories::DealStore;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

pub const DEFAULT_PAGE_SIZE: u32 = 12;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Participant count block of a deal detail
#[derive(Debug, Clone, Serialize)]
pub struct DealCounts {
    #[serde(rename = "groupBuys")]
    pub group_buys: i64,
}

/// A deal with its participants and price trail
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DealDetail {
    #[serde(flatten)]
    pub deal: Deal,
    pub group_buys: Vec<GroupBuyParticipant>,
    pub price_history: Vec<PriceHistory>,
    #[serde(rename = "_count")]
    pub count: DealCounts,
}

/// Deal catalogue: creation, listing, detail and status moves
pub struct DealService {
    store: Arc<dyn DealStore>,
}

impl DealService {
    pub fn new(store: Arc<dyn DealStore>) -> Self {
        Self { store }
    }

    /// Create a deal in `DRAFT` with its discount derived from the prices
    pub async fn create_deal(&self, input: NewDeal) -> AppResult<Deal> {
        let input = normalize(input)?;
        let discount = discount_percent(input.original_price, input.current_price)
            .map_err(|e| AppError::Validation(e.to_string()))?;

        let deal = input.into_deal(discount, Utc::now());
        let created = self.store.create_deal(&deal).await?;

        info!(
            "Created {} deal {} for merchant {} at {} ({}% off)",
            created.deal_type, created.id, created.merchant_id, created.current_price, discount
        );
        Ok(created)
    }

    pub async fn list_deals(&self, mut filter: DealFilter) -> AppResult<DealPage> {
        filter.page = filter.page.max(1);
        filter.limit = effective_limit(filter.limit);
        if let (Some(min), Some(max)) = (filter.min_price, filter.max_price) {
            if min > max {
                return Err(AppError::Validation(
                    "minPrice cannot exceed maxPrice".to_string(),
                ));
            }
        }

        Ok(self.store.list_deals(&filter, Utc::now()).await?)
    }

    pub async fn get_deal(&self, deal_id: Uuid) -> AppResult<Deal> {
        self.store
            .find_deal(deal_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Deal not found".to_string()))
    }

    pub async fn get_deal_detail(&self, deal_id: Uuid) -> AppResult<DealDetail> {
        let deal = self.get_deal(deal_id).await?;
        let group_buys = self.store.find_participants(deal_id).await?;
        let price_history = self.store.price_history(deal_id).await?;
        let group_buy_count = self.store.count_participants(deal_id).await?;

        Ok(DealDetail {
            deal,
            group_buys,
            price_history,
            count: DealCounts {
                group_buys: group_buy_count,
            },
        })
    }

    /// Move a deal along its lifecycle
    pub async fn update_status(&self, deal_id: Uuid, next: DealStatus) -> AppResult<Deal> {
        let deal = self.get_deal(deal_id).await?;
        deal.status
            .transition(next)
            .map_err(AppError::InvalidOperation)?;

        match self.store.update_deal_status(deal_id, deal.status, next).await? {
            Some(updated) => {
                info!("Deal {} moved {} -> {}", deal_id, deal.status, next);
                Ok(updated)
            }
            None => Err(AppError::InvalidOperation(format!(
                "Deal {} changed status concurrently, retry the request",
                deal_id
            ))),
        }
    }
}

/// Page size actually served for a requested `limit`; 0 means unspecified
pub fn effective_limit(limit: u32) -> u32 {
    match limit {
        0 => DEFAULT_PAGE_SIZE,
        n => n.min(MAX_PAGE_SIZE),
    }
}

/// Validate creation input and drop fields that do not apply to the deal type
fn normalize(mut input: NewDeal) -> AppResult<NewDeal> {
    if input.title.trim().is_empty() {
        return Err(AppError::Validation("title is required".to_string()));
    }
    if input.description.trim().is_empty() {
        return Err(AppError::Validation("description is required".to_string()));
    }
    if input.category.trim().is_empty() {
        return Err(AppError::Validation("category is required".to_string()));
    }
    validate_prices(input.original_price, input.current_price)
        .map_err(|e| AppError::Validation(e.to_string()))?;

    if let Some(end) = input.end_date {
        if end <= Utc::now() {
            return Err(AppError::Validation("endDate must be in the future".to_string()));
        }
    }

    match input.deal_type {
        DealType::GroupBuy => {
            match input.target_participants {
                Some(target) if target > 0 => {}
                _ => {
                    return Err(AppError::Validation(
                        "targetParticipants must be a positive integer for group buys"
                            .to_string(),
                    ))
                }
            }
            input.cashback_amount = None;
            input.cashback_percentage = None;
        }
        DealType::Instant => {
            input.target_participants = None;
            if input.cashback_amount.is_some_and(|a| a < Decimal::ZERO) {
                return Err(AppError::Validation(
                    "cashbackAmount cannot be negative".to_string(),
                ));
            }
            if input
                .cashback_percentage
                .is_some_and(|p| p < Decimal::ZERO || p > Decimal::ONE_HUNDRED)
            {
                return Err(AppError::Validation(
                    "cashbackPercentage must be between 0 and 100".to_string(),
                ));
            }
        }
    }

    Ok(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::MemoryDealStore;

    fn new_deal(deal_type: DealType) -> NewDeal {
        NewDeal {
            merchant_id: Uuid::new_v4(),
            title: "Air fryer".into(),
            description: "5.5L basket".into(),
            category: "kitchen".into(),
            deal_type,
            original_price: Decimal::new(200, 0),
            current_price: Decimal::new(150, 0),
            target_participants: Some(4),
            cashback_amount: Some(Decimal::new(10, 0)),
            cashback_percentage: None,
            end_date: None,
        }
    }

    #[tokio::test]
    async fn test_create_deal_derives_discount_and_drafts() {
        let svc = DealService::new(Arc::new(MemoryDealStore::new()));
        let deal = svc.create_deal(new_deal(DealType::GroupBuy)).await.unwrap();

        assert_eq!(deal.discount, 25);
        assert_eq!(deal.status, DealStatus::Draft);
        assert_eq!(deal.current_participants, 0);
        assert!(deal.cashback_amount.is_none());
    }

    #[tokio::test]
    async fn test_instant_deal_drops_target() {
        let svc = DealService::new(Arc::new(MemoryDealStore::new()));
        let deal = svc.create_deal(new_deal(DealType::Instant)).await.unwrap();

        assert!(deal.target_participants.is_none());
        assert_eq!(deal.cashback_amount, Some(Decimal::new(10, 0)));
    }

    #[tokio::test]
    async fn test_group_buy_requires_target() {
        let svc = DealService::new(Arc::new(MemoryDealStore::new()));
        let mut input = new_deal(DealType::GroupBuy);
        input.target_participants = None;

        let err = svc.create_deal(input).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_price_above_original_rejected() {
        let svc = DealService::new(Arc::new(MemoryDealStore::new()));
        let mut input = new_deal(DealType::Instant);
        input.current_price = Decimal::new(250, 0);

        assert!(svc.create_deal(input).await.is_err());
    }

    #[tokio::test]
    async fn test_status_transitions() {
        let svc = DealService::new(Arc::new(MemoryDealStore::new()));
        let deal = svc.create_deal(new_deal(DealType::GroupBuy)).await.unwrap();

        let active = svc.update_status(deal.id, DealStatus::Active).await.unwrap();
        assert_eq!(active.status, DealStatus::Active);

        let err = svc.update_status(deal.id, DealStatus::Draft).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidOperation(_)));

        let missing = svc.update_status(Uuid::new_v4(), DealStatus::Active).await.unwrap_err();
        assert!(missing.is_not_found());
    }

    #[tokio::test]
    async fn test_listing_hides_drafts_and_clamps_limit() {
        let svc = DealService::new(Arc::new(MemoryDealStore::new()));
        let draft = svc.create_deal(new_deal(DealType::GroupBuy)).await.unwrap();
        let live = svc.create_deal(new_deal(DealType::Instant)).await.unwrap();
        svc.update_status(live.id, DealStatus::Active).await.unwrap();

        let page = svc
            .list_deals(DealFilter {
                limit: 500,
                ..DealFilter::default()
            })
            .await
            .unwrap();

        assert_eq!(page.total, 1);
        assert_eq!(page.deals[0].id, live.id);
        assert!(page.deals.iter().all(|d| d.id != draft.id));
    }
}
