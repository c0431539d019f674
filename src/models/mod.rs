//! Domain models for the Deelbreaker backend.
//!
//! Deals, group-buy participation and the price-break audit trail.

pub mod deal;
pub mod participant;
pub mod price_history;

pub use deal::{Deal, DealFilter, DealPage, DealSort, DealStatus, DealType, NewDeal, SortOrder};
pub use participant::{GroupBuyParticipant, ParticipantStatus};
pub use price_history::PriceHistory;
