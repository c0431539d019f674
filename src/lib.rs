//! Deelbreaker Backend Library
//!
//! Group-buy deals engine and its HTTP/WebSocket surface, exposed for the
//! binary and for integration tests.

pub mod api;
pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod models;
pub mod notifications;
pub mod pricing;
pub mod repositories;
pub mod services;
pub mod websocket;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{AppError, AppResult};

use auth::AuthConfig;
use axum::extract::FromRef;
use config::GroupBuyConfig;
use database::Database;
use notifications::NotificationSink;
use pricing::PriceBreakPolicy;
use repositories::DealStore;
use services::{DealService, GroupBuyService};
use std::sync::Arc;

/// Shared state handed to every request handler
#[derive(Clone)]
pub struct AppState {
    pub deals: Arc<DealService>,
    pub group_buys: Arc<GroupBuyService>,
    pub auth: AuthConfig,
    /// Present when backed by PostgreSQL; used by the health check
    pub database: Option<Database>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn DealStore>,
        group_buy: &GroupBuyConfig,
        auth: AuthConfig,
        notifier: Arc<dyn NotificationSink>,
    ) -> AppResult<Self> {
        let policy = PriceBreakPolicy::new(group_buy.break_discount)
            .map_err(|e| AppError::Config(e.to_string()))?;

        Ok(Self {
            deals: Arc::new(DealService::new(store.clone())),
            group_buys: Arc::new(GroupBuyService::new(
                store,
                policy,
                group_buy.join_max_retries,
                notifier,
            )),
            auth,
            database: None,
        })
    }

    pub fn with_database(mut self, database: Database) -> Self {
        self.database = Some(database);
        self
    }
}

impl FromRef<AppState> for AuthConfig {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}
