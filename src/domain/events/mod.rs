//! Domain events
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "aggregate", content = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    Checkout(CheckoutEvent),
    Order(OrderEvent),
    Wallet(WalletEvent),
    Payment(PaymentEvent),
}

impl DomainEvent {
    /// NATS subject, e.g. `ecofashion.order.shipped`.
    pub fn subject(&self) -> String {
        let (aggregate, name) = match self {
            Self::Checkout(e) => ("checkout", e.name()),
            Self::Order(e) => ("order", e.name()),
            Self::Wallet(e) => ("wallet", e.name()),
            Self::Payment(e) => ("payment", e.name()),
        };
        format!("ecofashion.{aggregate}.{name}")
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckoutEvent {
    SessionCreated { group_id: Uuid, buyer_id: Uuid, order_ids: Vec<Uuid>, total: Decimal },
    SessionPaid { group_id: Uuid },
    SessionExpired { group_id: Uuid },
    SessionCancelled { group_id: Uuid },
}

impl CheckoutEvent {
    fn name(&self) -> &'static str {
        match self {
            Self::SessionCreated { .. } => "session_created",
            Self::SessionPaid { .. } => "session_paid",
            Self::SessionExpired { .. } => "session_expired",
            Self::SessionCancelled { .. } => "session_cancelled",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Created { order_id: Uuid, seller_id: Uuid, total: Decimal },
    Paid { order_id: Uuid },
    Processing { order_id: Uuid },
    Shipped { order_id: Uuid, tracking: Option<String> },
    Delivered { order_id: Uuid },
    Cancelled { order_id: Uuid, refunded: bool },
    Expired { order_id: Uuid },
    Settled { order_id: Uuid, seller_id: Uuid, payout: Decimal, commission: Decimal },
}

impl OrderEvent {
    fn name(&self) -> &'static str {
        match self {
            Self::Created { .. } => "created",
            Self::Paid { .. } => "paid",
            Self::Processing { .. } => "processing",
            Self::Shipped { .. } => "shipped",
            Self::Delivered { .. } => "delivered",
            Self::Cancelled { .. } => "cancelled",
            Self::Expired { .. } => "expired",
            Self::Settled { .. } => "settled",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WalletEvent {
    Credited { wallet_id: Uuid, amount: Decimal, balance: Decimal },
    Debited { wallet_id: Uuid, amount: Decimal, balance: Decimal },
}

impl WalletEvent {
    fn name(&self) -> &'static str {
        match self {
            Self::Credited { .. } => "credited",
            Self::Debited { .. } => "debited",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentEvent {
    Succeeded { payment_id: Uuid, amount: Decimal },
    Failed { payment_id: Uuid, response_code: Option<String> },
}

impl PaymentEvent {
    fn name(&self) -> &'static str {
        match self {
            Self::Succeeded { .. } => "succeeded",
            Self::Failed { .. } => "failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_follows_aggregate_and_event() {
        let e = DomainEvent::Order(OrderEvent::Shipped { order_id: Uuid::nil(), tracking: None });
        assert_eq!(e.subject(), "ecofashion.order.shipped");
    }

    #[test]
    fn serializes_tagged() {
        let e = DomainEvent::Wallet(WalletEvent::Credited { wallet_id: Uuid::nil(), amount: Decimal::new(5, 0), balance: Decimal::new(5, 0) });
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["aggregate"], "wallet");
        assert_eq!(json["event"]["type"], "credited");
    }
}
