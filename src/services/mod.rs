pub mod deal_service;
pub mod group_buy_service;

pub use deal_service::{DealCounts, DealDetail, DealService};
pub use group_buy_service::{GroupBuyService, JoinOutcome, PriceBreak};
