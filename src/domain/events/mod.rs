//! Domain events
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    Order(OrderEvent),
    Payment(PaymentEvent),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order_id: Uuid, user_id: Uuid, total: Decimal },
    Paid { order_id: Uuid, ref_id: String },
    Canceled { order_id: Uuid },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PaymentEvent {
    Started { order_id: Uuid, amount: Decimal },
    Failed { order_id: Uuid, reason: String },
}

impl DomainEvent {
    /// Message-bus subject the event is published on.
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Order(OrderEvent::Placed { .. }) => "shop.orders.placed",
            Self::Order(OrderEvent::Paid { .. }) => "shop.orders.paid",
            Self::Order(OrderEvent::Canceled { .. }) => "shop.orders.canceled",
            Self::Payment(PaymentEvent::Started { .. }) => "shop.payments.started",
            Self::Payment(PaymentEvent::Failed { .. }) => "shop.payments.failed",
        }
    }
}
