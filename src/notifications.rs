use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Mutex;
use uuid::Uuid;

/// Change pushed to observers of a deal after a join commits
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DealNotification {
    /// A price break took effect
    PriceUpdated {
        deal_id: Uuid,
        price: Decimal,
        participants: i32,
        discount: i32,
    },
    /// Participation moved, with or without a break
    GroupBuyProgress {
        deal_id: Uuid,
        current_participants: i32,
        target_participants: Option<i32>,
        current_price: Decimal,
    },
    /// Sent to the joining user only
    JoinConfirmed {
        user_id: Uuid,
        deal_id: Uuid,
        quantity: i32,
        price: Decimal,
    },
}

impl DealNotification {
    pub fn deal_id(&self) -> Uuid {
        match self {
            DealNotification::PriceUpdated { deal_id, .. }
            | DealNotification::GroupBuyProgress { deal_id, .. }
            | DealNotification::JoinConfirmed { deal_id, .. } => *deal_id,
        }
    }

    /// Room the notification is scoped to
    pub fn room(&self) -> String {
        match self {
            DealNotification::JoinConfirmed { user_id, .. } => format!("user:{}", user_id),
            _ => format!("deal:{}", self.deal_id()),
        }
    }
}

/// Fire-and-forget delivery of deal changes.
///
/// `notify` is called after the transaction has committed and must not
/// block. Delivery errors are the implementation's to log; the caller never
/// sees them.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: DealNotification);
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl NotificationSink for NoopNotifier {
    fn notify(&self, _notification: DealNotification) {}
}

/// Keeps every notification in memory, for tests and local inspection
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<DealNotification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<DealNotification> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }

    pub fn price_updates(&self) -> Vec<DealNotification> {
        self.sent()
            .into_iter()
            .filter(|n| matches!(n, DealNotification::PriceUpdated { .. }))
            .collect()
    }
}

impl NotificationSink for RecordingNotifier {
    fn notify(&self, notification: DealNotification) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(notification);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_wire_shape() {
        let deal_id = Uuid::new_v4();
        let n = DealNotification::PriceUpdated {
            deal_id,
            price: Decimal::new(800, 0),
            participants: 2,
            discount: 20,
        };

        let value = serde_json::to_value(&n).unwrap();
        assert_eq!(value["type"], "price_updated");
        assert_eq!(value["participants"], 2);
        assert_eq!(n.room(), format!("deal:{}", deal_id));
    }

    #[test]
    fn test_join_confirmation_goes_to_user_room() {
        let user_id = Uuid::new_v4();
        let n = DealNotification::JoinConfirmed {
            user_id,
            deal_id: Uuid::new_v4(),
            quantity: 1,
            price: Decimal::new(1000, 0),
        };

        assert_eq!(n.room(), format!("user:{}", user_id));
        assert_eq!(serde_json::to_value(&n).unwrap()["type"], "join_confirmed");
    }

    #[test]
    fn test_recording_notifier_filters_price_updates() {
        let sink = RecordingNotifier::new();
        let deal_id = Uuid::new_v4();
        sink.notify(DealNotification::GroupBuyProgress {
            deal_id,
            current_participants: 1,
            target_participants: Some(2),
            current_price: Decimal::new(1000, 0),
        });
        sink.notify(DealNotification::PriceUpdated {
            deal_id,
            price: Decimal::new(800, 0),
            participants: 2,
            discount: 20,
        });

        assert_eq!(sink.sent().len(), 2);
        assert_eq!(sink.price_updates().len(), 1);
    }
}
