use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Participation status in a group buy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParticipantStatus {
    Active,
    Completed,
    Cancelled,
    Expired,
}

impl ParticipantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantStatus::Active => "ACTIVE",
            ParticipantStatus::Completed => "COMPLETED",
            ParticipantStatus::Cancelled => "CANCELLED",
            ParticipantStatus::Expired => "EXPIRED",
        }
    }

    /// Only `Active` participations move, and only to a terminal state
    pub fn can_transition_to(&self, next: ParticipantStatus) -> bool {
        *self == ParticipantStatus::Active && next != ParticipantStatus::Active
    }
}

impl FromStr for ParticipantStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "ACTIVE" => Ok(ParticipantStatus::Active),
            "COMPLETED" => Ok(ParticipantStatus::Completed),
            "CANCELLED" => Ok(ParticipantStatus::Cancelled),
            "EXPIRED" => Ok(ParticipantStatus::Expired),
            _ => Err(format!("Invalid participant status: {}", s)),
        }
    }
}

impl fmt::Display for ParticipantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One user's membership in one deal's group buy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupBuyParticipant {
    pub id: Uuid,
    pub user_id: Uuid,
    pub deal_id: Uuid,
    pub quantity: i32,
    /// Frozen at join time
    pub price_at_join: Decimal,
    /// Follows the deal's live price
    pub current_price: Decimal,
    pub status: ParticipantStatus,
    pub joined_at: DateTime<Utc>,
}

impl GroupBuyParticipant {
    /// Create an active participant at the deal's current price
    pub fn new(user_id: Uuid, deal_id: Uuid, quantity: i32, price: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            deal_id,
            quantity,
            price_at_join: price,
            current_price: price,
            status: ParticipantStatus::Active,
            joined_at: Utc::now(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == ParticipantStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_participant_freezes_join_price() {
        let p = GroupBuyParticipant::new(Uuid::new_v4(), Uuid::new_v4(), 2, Decimal::new(1000, 0));
        assert_eq!(p.price_at_join, p.current_price);
        assert!(p.is_active());
        assert_eq!(p.quantity, 2);
    }

    #[test]
    fn test_status_transitions() {
        assert!(ParticipantStatus::Active.can_transition_to(ParticipantStatus::Completed));
        assert!(ParticipantStatus::Active.can_transition_to(ParticipantStatus::Cancelled));
        assert!(!ParticipantStatus::Active.can_transition_to(ParticipantStatus::Active));
        assert!(!ParticipantStatus::Cancelled.can_transition_to(ParticipantStatus::Active));
        assert_eq!("expired".parse::<ParticipantStatus>().unwrap(), ParticipantStatus::Expired);
    }
}
