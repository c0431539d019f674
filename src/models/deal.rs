use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Kind of offer a deal represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DealType {
    Instant,
    GroupBuy,
}

impl DealType {
    /// Convert to database string
    pub fn as_str(&self) -> &'static str {
        match self {
            DealType::Instant => "INSTANT",
            DealType::GroupBuy => "GROUP_BUY",
        }
    }
}

impl FromStr for DealType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "INSTANT" => Ok(DealType::Instant),
            "GROUP_BUY" => Ok(DealType::GroupBuy),
            _ => Err(format!("Invalid deal type: {}", s)),
        }
    }
}

impl fmt::Display for DealType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deal lifecycle status
///
/// Transitions:
/// - `Draft` -> `Active` | `Cancelled`
/// - `Active` -> `Paused` | `Completed` | `Expired` | `Cancelled`
/// - `Paused` -> `Active` | `Expired` | `Cancelled`
///
/// `Completed`, `Expired` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DealStatus {
    Draft,
    Active,
    Paused,
    Completed,
    Expired,
    Cancelled,
}

impl DealStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DealStatus::Draft => "DRAFT",
            DealStatus::Active => "ACTIVE",
            DealStatus::Paused => "PAUSED",
            DealStatus::Completed => "COMPLETED",
            DealStatus::Expired => "EXPIRED",
            DealStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DealStatus::Completed | DealStatus::Expired | DealStatus::Cancelled
        )
    }

    pub fn can_transition_to(&self, next: DealStatus) -> bool {
        use DealStatus::*;
        matches!(
            (self, next),
            (Draft, Active)
                | (Draft, Cancelled)
                | (Active, Paused)
                | (Active, Completed)
                | (Active, Expired)
                | (Active, Cancelled)
                | (Paused, Active)
                | (Paused, Expired)
                | (Paused, Cancelled)
        )
    }

    /// Validate a transition, returning the new status
    pub fn transition(self, next: DealStatus) -> Result<DealStatus, String> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(format!(
                "Cannot move deal from {} to {}",
                self.as_str(),
                next.as_str()
            ))
        }
    }
}

impl FromStr for DealStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "DRAFT" => Ok(DealStatus::Draft),
            "ACTIVE" => Ok(DealStatus::Active),
            "PAUSED" => Ok(DealStatus::Paused),
            "COMPLETED" => Ok(DealStatus::Completed),
            "EXPIRED" => Ok(DealStatus::Expired),
            "CANCELLED" => Ok(DealStatus::Cancelled),
            _ => Err(format!("Invalid deal status: {}", s)),
        }
    }
}

impl fmt::Display for DealStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A sellable offer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deal {
    pub id: Uuid,
    pub merchant_id: Uuid,
    pub title: String,
    pub description: String,
    pub category: String,
    #[serde(rename = "type")]
    pub deal_type: DealType,
    pub original_price: Decimal,
    pub current_price: Decimal,
    /// Integer percentage cached from the two prices
    pub discount: i32,
    pub target_participants: Option<i32>,
    pub current_participants: i32,
    pub cashback_amount: Option<Decimal>,
    pub cashback_percentage: Option<Decimal>,
    pub status: DealStatus,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Deal {
    pub fn is_group_buy(&self) -> bool {
        self.deal_type == DealType::GroupBuy
    }

    /// A deal with an end date in the past accepts no new joins
    pub fn has_expired(&self, now: DateTime<Utc>) -> bool {
        self.end_date.map(|end| end < now).unwrap_or(false)
    }

    /// Whether the participant count has reached the configured target
    pub fn threshold_reached(&self) -> bool {
        match self.target_participants {
            Some(target) => self.current_participants >= target,
            None => false,
        }
    }

    /// Listed deals are active and not past their end date
    pub fn is_listed(&self, now: DateTime<Utc>) -> bool {
        self.status == DealStatus::Active && self.start_date <= now && !self.has_expired(now)
    }
}

/// Input for creating a deal
#[derive(Debug, Clone)]
pub struct NewDeal {
    pub merchant_id: Uuid,
    pub title: String,
    pub description: String,
    pub category: String,
    pub deal_type: DealType,
    pub original_price: Decimal,
    pub current_price: Decimal,
    pub target_participants: Option<i32>,
    pub cashback_amount: Option<Decimal>,
    pub cashback_percentage: Option<Decimal>,
    pub end_date: Option<DateTime<Utc>>,
}

impl NewDeal {
    /// Materialize a `DRAFT` deal with a cached discount
    pub fn into_deal(self, discount: i32, now: DateTime<Utc>) -> Deal {
        Deal {
            id: Uuid::new_v4(),
            merchant_id: self.merchant_id,
            title: self.title,
            description: self.description,
            category: self.category,
            deal_type: self.deal_type,
            original_price: self.original_price,
            current_price: self.current_price,
            discount,
            target_participants: self.target_participants,
            current_participants: 0,
            cashback_amount: self.cashback_amount,
            cashback_percentage: self.cashback_percentage,
            status: DealStatus::Draft,
            start_date: now,
            end_date: self.end_date,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Sort key for deal listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum DealSort {
    #[default]
    #[serde(rename = "createdAt")]
    CreatedAt,
    #[serde(rename = "price")]
    Price,
    #[serde(rename = "discount")]
    Discount,
    /// Soonest end date first, open-ended deals last
    #[serde(rename = "ending")]
    Ending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Filters for listing deals
#[derive(Debug, Clone, Default)]
pub struct DealFilter {
    pub deal_type: Option<DealType>,
    pub category: Option<String>,
    pub search: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    /// Percent; fractional thresholds compare against the whole-number discount
    pub min_discount: Option<Decimal>,
    pub sort_by: DealSort,
    pub sort_order: SortOrder,
    pub page: u32,
    pub limit: u32,
}

impl DealFilter {
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }

    /// In-process form of the listing predicate; the SQL store mirrors it
    pub fn matches(&self, deal: &Deal, now: DateTime<Utc>) -> bool {
        if !deal.is_listed(now) {
            return false;
        }
        if let Some(deal_type) = self.deal_type {
            if deal.deal_type != deal_type {
                return false;
            }
        }
        if let Some(category) = &self.category {
            if &deal.category != category {
                return false;
            }
        }
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            if !deal.title.to_lowercase().contains(&needle)
                && !deal.description.to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        if let Some(min) = self.min_price {
            if deal.current_price < min {
                return false;
            }
        }
        if let Some(max) = self.max_price {
            if deal.current_price > max {
                return false;
            }
        }
        if let Some(min) = self.min_discount {
            if Decimal::from(deal.discount) < min {
                return false;
            }
        }
        true
    }
}

/// One page of a listing
#[derive(Debug, Clone, Serialize)]
pub struct DealPage {
    pub deals: Vec<Deal>,
    pub total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_deal() -> Deal {
        let now = Utc::now();
        NewDeal {
            merchant_id: Uuid::new_v4(),
            title: "Espresso machine".into(),
            description: "Dual boiler".into(),
            category: "kitchen".into(),
            deal_type: DealType::GroupBuy,
            original_price: Decimal::new(1000, 0),
            current_price: Decimal::new(1000, 0),
            target_participants: Some(2),
            cashback_amount: None,
            cashback_percentage: None,
            end_date: None,
        }
        .into_deal(0, now)
    }

    #[test]
    fn test_deal_type_round_trips_through_db_string() {
        assert_eq!(DealType::GroupBuy.as_str(), "GROUP_BUY");
        assert_eq!("group_buy".parse::<DealType>().unwrap(), DealType::GroupBuy);
        assert!("BUNDLE".parse::<DealType>().is_err());
    }

    #[test]
    fn test_status_transition_table() {
        assert!(DealStatus::Draft.can_transition_to(DealStatus::Active));
        assert!(DealStatus::Active.can_transition_to(DealStatus::Paused));
        assert!(DealStatus::Paused.can_transition_to(DealStatus::Active));
        assert!(!DealStatus::Draft.can_transition_to(DealStatus::Completed));
        assert!(!DealStatus::Active.can_transition_to(DealStatus::Draft));
        for terminal in [DealStatus::Completed, DealStatus::Expired, DealStatus::Cancelled] {
            assert!(terminal.is_terminal());
            assert!(!terminal.can_transition_to(DealStatus::Active));
        }
        assert!(DealStatus::Completed.transition(DealStatus::Active).is_err());
    }

    #[test]
    fn test_has_expired() {
        let mut deal = sample_deal();
        let now = Utc::now();
        assert!(!deal.has_expired(now));

        deal.end_date = Some(now - Duration::days(1));
        assert!(deal.has_expired(now));

        deal.end_date = Some(now + Duration::days(1));
        assert!(!deal.has_expired(now));
    }

    #[test]
    fn test_threshold_reached() {
        let mut deal = sample_deal();
        assert!(!deal.threshold_reached());
        deal.current_participants = 2;
        assert!(deal.threshold_reached());

        deal.target_participants = None;
        assert!(!deal.threshold_reached());
    }

    #[test]
    fn test_filter_requires_active_status() {
        let mut deal = sample_deal();
        let filter = DealFilter {
            page: 1,
            limit: 12,
            ..Default::default()
        };
        let now = Utc::now() + Duration::seconds(1);
        assert!(!filter.matches(&deal, now));

        deal.status = DealStatus::Active;
        assert!(filter.matches(&deal, now));

        let search = DealFilter {
            search: Some("ESPRESSO".into()),
            ..filter.clone()
        };
        assert!(search.matches(&deal, now));

        let too_cheap = DealFilter {
            min_price: Some(Decimal::new(2000, 0)),
            ..filter
        };
        assert!(!too_cheap.matches(&deal, now));
    }

    #[test]
    fn test_deal_serializes_with_api_field_names() {
        let deal = sample_deal();
        let json = serde_json::to_value(&deal).unwrap();
        assert_eq!(json["type"], "GROUP_BUY");
        assert_eq!(json["status"], "DRAFT");
        assert!(json.get("currentPrice").is_some());
        assert!(json.get("targetParticipants").is_some());
    }
}
