#![allow(dead_code)]

use chrono::{Duration, Utc};
use deelbreaker_backend::auth::{issue_token, AuthConfig, ROLE_CUSTOMER};
use deelbreaker_backend::config::GroupBuyConfig;
use deelbreaker_backend::models::*;
use deelbreaker_backend::notifications::RecordingNotifier;
use deelbreaker_backend::pricing::PriceBreakPolicy;
use deelbreaker_backend::repositories::*;
use deelbreaker_backend::services::GroupBuyService;
use deelbreaker_backend::AppState;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

pub const TEST_JWT_SECRET: &str = "deelbreaker-test-secret";

/// Engine wired to an in-memory store with recorded notifications
pub struct TestEngine {
    pub store: MemoryDealStore,
    pub notifier: Arc<RecordingNotifier>,
    pub service: Arc<GroupBuyService>,
}

impl TestEngine {
    pub fn new() -> Self {
        Self::with_retries(3)
    }

    pub fn with_retries(max_retries: u32) -> Self {
        let store = MemoryDealStore::new();
        let notifier = Arc::new(RecordingNotifier::new());
        let service = Arc::new(GroupBuyService::new(
            Arc::new(store.clone()),
            PriceBreakPolicy::default(),
            max_retries,
            notifier.clone(),
        ));

        Self {
            store,
            notifier,
            service,
        }
    }

    /// Seed a deal exactly as given
    pub fn seed(&self, deal: Deal) -> Deal {
        self.store
            .insert_deal(deal.clone())
            .expect("Failed to seed deal");
        deal
    }

    pub async fn deal(&self, deal_id: Uuid) -> Deal {
        self.store
            .find_deal(deal_id)
            .await
            .expect("Failed to read deal")
            .expect("Deal missing")
    }

    pub async fn participants(&self, deal_id: Uuid) -> Vec<GroupBuyParticipant> {
        self.store
            .find_participants(deal_id)
            .await
            .expect("Failed to read participants")
    }

    pub async fn history(&self, deal_id: Uuid) -> Vec<PriceHistory> {
        self.store
            .price_history(deal_id)
            .await
            .expect("Failed to read price history")
    }
}

/// An active group buy at `price` with the given target
pub fn group_buy_deal(price: i64, target: i32) -> Deal {
    let mut deal = NewDeal {
        merchant_id: Uuid::new_v4(),
        title: "Robot vacuum".to_string(),
        description: "Lidar navigation, self-emptying dock".to_string(),
        category: "home".to_string(),
        deal_type: DealType::GroupBuy,
        original_price: Decimal::new(price, 0),
        current_price: Decimal::new(price, 0),
        target_participants: Some(target),
        cashback_amount: None,
        cashback_percentage: None,
        end_date: None,
    }
    .into_deal(0, Utc::now() - Duration::minutes(1));
    deal.status = DealStatus::Active;
    deal
}

pub fn instant_deal(price: i64) -> Deal {
    let mut deal = group_buy_deal(price, 1);
    deal.deal_type = DealType::Instant;
    deal.target_participants = None;
    deal.cashback_percentage = Some(Decimal::new(5, 0));
    deal
}

pub fn expired_group_buy(price: i64, target: i32) -> Deal {
    let mut deal = group_buy_deal(price, target);
    deal.end_date = Some(Utc::now() - Duration::days(1));
    deal
}

/// Core invariants that must hold after any committed join sequence
pub async fn assert_deal_consistent(engine: &TestEngine, deal_id: Uuid) {
    let deal = engine.deal(deal_id).await;
    let participants = engine.participants(deal_id).await;
    let history = engine.history(deal_id).await;

    assert!(deal.current_price <= deal.original_price);
    assert!(deal.current_price > Decimal::ZERO);
    assert_eq!(deal.current_participants as usize, participants.len());

    for p in participants.iter().filter(|p| p.is_active()) {
        assert_eq!(
            p.current_price, deal.current_price,
            "participant {} holds a stale price",
            p.user_id
        );
    }

    assert!(deelbreaker_backend::pricing::is_non_increasing(&history));
    assert_eq!(
        deelbreaker_backend::pricing::replay_history(deal.original_price, &history),
        deal.current_price
    );

    let mut users: Vec<Uuid> = participants.iter().map(|p| p.user_id).collect();
    users.sort();
    users.dedup();
    assert_eq!(users.len(), participants.len(), "duplicate participation");
}

/// App state over an in-memory store
pub fn test_app_state(store: &MemoryDealStore) -> AppState {
    AppState::new(
        Arc::new(store.clone()),
        &GroupBuyConfig::default(),
        AuthConfig::new(TEST_JWT_SECRET),
        Arc::new(RecordingNotifier::new()),
    )
    .expect("Failed to build app state")
}

pub fn bearer(user_id: Uuid, role: &str) -> String {
    let token = issue_token(TEST_JWT_SECRET, user_id, role, Duration::hours(1))
        .expect("Failed to issue token");
    format!("Bearer {}", token)
}

pub fn customer_bearer(user_id: Uuid) -> String {
    bearer(user_id, ROLE_CUSTOMER)
}
