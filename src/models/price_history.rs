use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Append-only record of a price break
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceHistory {
    pub id: Uuid,
    pub deal_id: Uuid,
    /// Price that took effect
    pub price: Decimal,
    /// Participant count when it took effect
    pub participants: i32,
    pub timestamp: DateTime<Utc>,
}

impl PriceHistory {
    pub fn new(deal_id: Uuid, price: Decimal, participants: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            deal_id,
            price,
            participants,
            timestamp: Utc::now(),
        }
    }
}
