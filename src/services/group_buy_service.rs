use crate::error::{AppError, AppResult, RepositoryError};
use crate::models::{Deal, GroupBuyParticipant, PriceHistory};
use crate::notifications::{DealNotification, NotificationSink};
use crate::pricing::{discount_percent, PriceBreakPolicy};
use crate::repositories::{DealStore, DealTransaction};
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const JOIN_SUCCESS_MESSAGE: &str = "Successfully joined group buy!";

/// A price break applied by a join
#[derive(Debug, Clone, PartialEq)]
pub struct PriceBreak {
    pub old_price: Decimal,
    pub new_price: Decimal,
    pub discount: i32,
    pub participants: i32,
    /// Active participants moved to the new price
    pub repriced: u64,
}

/// Result of a committed join
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub participant: GroupBuyParticipant,
    /// Deal state as committed
    pub deal: Deal,
    pub price_break: Option<PriceBreak>,
    pub message: String,
}

/// Group-buy engine: admits participants and applies price breaks
pub struct GroupBuyService {
    store: Arc<dyn DealStore>,
    policy: PriceBreakPolicy,
    max_retries: u32,
    notifier: Arc<dyn NotificationSink>,
}

impl GroupBuyService {
    pub fn new(
        store: Arc<dyn DealStore>,
        policy: PriceBreakPolicy,
        max_retries: u32,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            store,
            policy,
            max_retries,
            notifier,
        }
    }

    pub fn policy(&self) -> &PriceBreakPolicy {
        &self.policy
    }

    /// Join `user_id` to the group buy of `deal_id`.
    ///
    /// Validation, the participant insert, the counter increment and any
    /// price break commit together or not at all. Transient storage failures
    /// rerun the whole unit; rejections are returned as-is. Observers are
    /// notified only after the commit.
    pub async fn join_group_buy(
        &self,
        user_id: Uuid,
        deal_id: Uuid,
        quantity: Option<i32>,
    ) -> AppResult<JoinOutcome> {
        let mut attempt = 0;
        loop {
            match self.try_join(user_id, deal_id, quantity).await {
                Ok(outcome) => {
                    self.publish(&outcome);
                    return Ok(outcome);
                }
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        "Transient failure joining deal {} for user {} (retry {}/{}): {}",
                        deal_id, user_id, attempt, self.max_retries, e
                    );
                }
                Err(e) => {
                    if e.is_rejection() {
                        debug!("Join rejected: deal={}, user={}: {}", deal_id, user_id, e);
                    } else {
                        warn!("Join failed: deal={}, user={}: {}", deal_id, user_id, e);
                    }
                    return Err(e);
                }
            }
        }
    }

    async fn try_join(
        &self,
        user_id: Uuid,
        deal_id: Uuid,
        quantity: Option<i32>,
    ) -> AppResult<JoinOutcome> {
        let mut tx = self.store.begin().await?;

        let deal = tx
            .lock_deal(deal_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Deal not found".to_string()))?;

        if !deal.is_group_buy() {
            return Err(AppError::InvalidOperation(
                "This is not a group buy deal".to_string(),
            ));
        }

        if tx.find_participant(deal_id, user_id).await?.is_some() {
            return Err(AppError::AlreadyJoined(
                "You have already joined this group buy".to_string(),
            ));
        }

        if deal.has_expired(Utc::now()) {
            return Err(AppError::Expired("This group buy has expired".to_string()));
        }

        let quantity = quantity.unwrap_or(1);
        if quantity <= 0 {
            return Err(AppError::Validation(
                "Quantity must be a positive integer".to_string(),
            ));
        }

        let mut participant =
            GroupBuyParticipant::new(user_id, deal_id, quantity, deal.current_price);
        tx.insert_participant(&participant)
            .await
            .map_err(|e| match e {
                RepositoryError::Duplicate(_) => AppError::AlreadyJoined(
                    "You have already joined this group buy".to_string(),
                ),
                other => other.into(),
            })?;

        let mut deal = tx.increment_participants(deal_id).await?;

        let price_break = self.evaluate_price_break(&mut tx, &deal).await?;
        if let Some(applied) = &price_break {
            deal.current_price = applied.new_price;
            deal.discount = applied.discount;
            participant.current_price = applied.new_price;
        }

        tx.commit().await?;

        info!(
            "User {} joined group buy {} ({}/{})",
            user_id,
            deal_id,
            deal.current_participants,
            deal.target_participants
                .map(|t| t.to_string())
                .unwrap_or_else(|| "-".to_string())
        );

        Ok(JoinOutcome {
            participant,
            deal,
            price_break,
            message: JOIN_SUCCESS_MESSAGE.to_string(),
        })
    }

    /// Apply the break if the threshold is met and has not fired yet.
    ///
    /// Runs inside the join's transaction, after the increment.
    async fn evaluate_price_break(
        &self,
        tx: &mut Box<dyn DealTransaction>,
        deal: &Deal,
    ) -> AppResult<Option<PriceBreak>> {
        let Some(target) = deal.target_participants else {
            return Ok(None);
        };
        if !deal.threshold_reached() {
            return Ok(None);
        }

        let already_applied = tx.break_already_applied(deal.id, target).await?;
        if !self.policy.should_break(deal, already_applied) {
            debug!(
                "Deal {} already broke at target {}, price stays {}",
                deal.id, target, deal.current_price
            );
            return Ok(None);
        }

        let old_price = deal.current_price;
        let new_price = self.policy.next_price(old_price);
        let discount = discount_percent(deal.original_price, new_price)
            .map_err(|e| AppError::Message(e.to_string()))?;

        tx.apply_price(deal.id, new_price, discount).await?;
        let repriced = tx.reprice_active_participants(deal.id, new_price).await?;
        tx.append_price_history(&PriceHistory::new(
            deal.id,
            new_price,
            deal.current_participants,
        ))
        .await?;

        info!(
            "Price break on deal {}: {} -> {} at {} participants ({} repriced, {}% off)",
            deal.id, old_price, new_price, deal.current_participants, repriced, discount
        );

        Ok(Some(PriceBreak {
            old_price,
            new_price,
            discount,
            participants: deal.current_participants,
            repriced,
        }))
    }

    fn publish(&self, outcome: &JoinOutcome) {
        let deal = &outcome.deal;
        if let Some(applied) = &outcome.price_break {
            self.notifier.notify(DealNotification::PriceUpdated {
                deal_id: deal.id,
                price: applied.new_price,
                participants: applied.participants,
                discount: applied.discount,
            });
        }
        self.notifier.notify(DealNotification::GroupBuyProgress {
            deal_id: deal.id,
            current_participants: deal.current_participants,
            target_participants: deal.target_participants,
            current_price: deal.current_price,
        });
        self.notifier.notify(DealNotification::JoinConfirmed {
            user_id: outcome.participant.user_id,
            deal_id: deal.id,
            quantity: outcome.participant.quantity,
            price: outcome.participant.current_price,
        });
    }

    /// Price breaks of a deal, oldest first
    pub async fn price_history(&self, deal_id: Uuid) -> AppResult<Vec<PriceHistory>> {
        if self.store.find_deal(deal_id).await?.is_none() {
            return Err(AppError::NotFound("Deal not found".to_string()));
        }
        Ok(self.store.price_history(deal_id).await?)
    }
}
