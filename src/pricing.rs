use crate::models::{Deal, PriceHistory};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use thiserror::Error;

/// Error types for pricing operations
#[derive(Error, Debug, PartialEq)]
pub enum PricingError {
    #[error("Invalid discount: {0}")]
    InvalidDiscount(String),

    #[error("Invalid price: {0}")]
    InvalidPrice(String),
}

/// Result type for pricing operations
pub type PricingResult<T> = Result<T, PricingError>;

/// Group-buy price-break rule
///
/// When a deal's participant count reaches its target, the current price drops
/// by `break_discount` of itself: `new = current * (1 - break_discount)`.
/// Discounts stack multiplicatively on the already-discounted price.
#[derive(Debug, Clone, Copy)]
pub struct PriceBreakPolicy {
    /// Fraction taken off the current price (0.20 by default)
    break_discount: Decimal,
    /// Prices never drop below one cent
    min_price: Decimal,
}

impl PriceBreakPolicy {
    pub fn new(break_discount: Decimal) -> PricingResult<Self> {
        if break_discount <= Decimal::ZERO || break_discount >= Decimal::ONE {
            return Err(PricingError::InvalidDiscount(format!(
                "break discount must be in (0, 1), got {}",
                break_discount
            )));
        }

        Ok(Self {
            break_discount,
            min_price: Decimal::new(1, 2), // 0.01
        })
    }

    pub fn break_discount(&self) -> Decimal {
        self.break_discount
    }

    /// Price after one break, rounded to cents
    pub fn next_price(&self, current: Decimal) -> Decimal {
        let raw = current * (Decimal::ONE - self.break_discount);
        let rounded = raw.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        rounded.max(self.min_price).min(current)
    }

    /// Whether this deal is due a break.
    ///
    /// `already_applied` is true when the trail already holds an entry at or
    /// past the target; the break fires once per threshold.
    pub fn should_break(&self, deal: &Deal, already_applied: bool) -> bool {
        deal.is_group_buy() && deal.threshold_reached() && !already_applied
    }

    /// Price expected after `depth` stacked breaks from `start`
    pub fn price_after(&self, start: Decimal, depth: u32) -> Decimal {
        (0..depth).fold(start, |price, _| self.next_price(price))
    }
}

impl Default for PriceBreakPolicy {
    fn default() -> Self {
        Self {
            break_discount: Decimal::new(20, 2),
            min_price: Decimal::new(1, 2),
        }
    }
}

/// Integer discount percentage, `round((original - price) / original * 100)`
pub fn discount_percent(original: Decimal, price: Decimal) -> PricingResult<i32> {
    if original <= Decimal::ZERO {
        return Err(PricingError::InvalidPrice(
            "original price must be positive".to_string(),
        ));
    }

    let percent = ((original - price) / original * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);

    percent
        .to_i32()
        .ok_or_else(|| PricingError::InvalidPrice(format!("discount out of range: {}", percent)))
}

/// Check the price pair a deal may be created or updated with
pub fn validate_prices(original: Decimal, current: Decimal) -> PricingResult<()> {
    if original <= Decimal::ZERO {
        return Err(PricingError::InvalidPrice(
            "originalPrice must be greater than 0".to_string(),
        ));
    }
    if current <= Decimal::ZERO {
        return Err(PricingError::InvalidPrice(
            "currentPrice must be greater than 0".to_string(),
        ));
    }
    if current > original {
        return Err(PricingError::InvalidPrice(
            "currentPrice cannot exceed originalPrice".to_string(),
        ));
    }
    Ok(())
}

/// Rebuild the live price from the starting price and the ordered trail
pub fn replay_history(start: Decimal, history: &[PriceHistory]) -> Decimal {
    history.iter().fold(start, |_, entry| entry.price)
}

/// Prices in the trail never go up
pub fn is_non_increasing(history: &[PriceHistory]) -> bool {
    history.windows(2).all(|w| w[1].price <= w[0].price)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn d(units: i64, scale: u32) -> Decimal {
        Decimal::new(units, scale)
    }

    #[test]
    fn test_policy_rejects_out_of_range_discount() {
        assert!(PriceBreakPolicy::new(Decimal::ZERO).is_err());
        assert!(PriceBreakPolicy::new(Decimal::ONE).is_err());
        assert!(PriceBreakPolicy::new(d(25, 2)).is_ok());
    }

    #[test]
    fn test_next_price_takes_twenty_percent_off_current() {
        let policy = PriceBreakPolicy::default();
        assert_eq!(policy.next_price(d(1000, 0)), d(800, 0));
        assert_eq!(policy.next_price(d(800, 0)), d(640, 0));
    }

    #[test]
    fn test_breaks_stack_multiplicatively() {
        let policy = PriceBreakPolicy::default();
        // 1000 * 0.8^3 = 512
        assert_eq!(policy.price_after(d(1000, 0), 3), d(512, 0));
        assert_eq!(policy.price_after(d(1000, 0), 0), d(1000, 0));
    }

    #[test]
    fn test_next_price_rounds_to_cents() {
        let policy = PriceBreakPolicy::default();
        // 19.99 * 0.8 = 15.992
        assert_eq!(policy.next_price(d(1999, 2)), d(1599, 2));
        // 0.05 * 0.8 = 0.04
        assert_eq!(policy.next_price(d(5, 2)), d(4, 2));
    }

    #[test]
    fn test_next_price_never_reaches_zero() {
        let policy = PriceBreakPolicy::default();
        assert_eq!(policy.next_price(d(1, 2)), d(1, 2));
    }

    #[test]
    fn test_discount_percent() {
        assert_eq!(discount_percent(d(1000, 0), d(800, 0)).unwrap(), 20);
        assert_eq!(discount_percent(d(1000, 0), d(1000, 0)).unwrap(), 0);
        // 1 - 2/3 = 33.33..%
        assert_eq!(discount_percent(d(300, 0), d(200, 0)).unwrap(), 33);
        // 12.5% rounds up
        assert_eq!(discount_percent(d(800, 0), d(700, 0)).unwrap(), 13);
        assert!(discount_percent(Decimal::ZERO, d(1, 0)).is_err());
    }

    #[test]
    fn test_validate_prices() {
        assert!(validate_prices(d(100, 0), d(80, 0)).is_ok());
        assert!(validate_prices(d(100, 0), d(100, 0)).is_ok());
        assert!(validate_prices(d(100, 0), d(120, 0)).is_err());
        assert!(validate_prices(d(100, 0), Decimal::ZERO).is_err());
        assert!(validate_prices(Decimal::ZERO, Decimal::ZERO).is_err());
    }

    #[test]
    fn test_replay_history() {
        let deal_id = Uuid::new_v4();
        let start = d(1000, 0);
        assert_eq!(replay_history(start, &[]), start);

        let trail = vec![
            PriceHistory::new(deal_id, d(800, 0), 2),
            PriceHistory::new(deal_id, d(640, 0), 5),
        ];
        assert_eq!(replay_history(start, &trail), d(640, 0));
        assert!(is_non_increasing(&trail));

        let rising = vec![
            PriceHistory::new(deal_id, d(640, 0), 2),
            PriceHistory::new(deal_id, d(800, 0), 5),
        ];
        assert!(!is_non_increasing(&rising));
    }
}
