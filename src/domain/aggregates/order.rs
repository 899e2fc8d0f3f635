//! Order Aggregate
//!
//! One order per seller per checkout session. Payment and fulfillment are
//! tracked separately; fulfillment follows
//! `Pending -> Processing -> Shipped -> Delivered`, with `Cancelled`
//! reachable before shipment.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::aggregates::payment::PaymentMethod;
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::value_objects::{Money, MoneyError};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Order {
    id: Uuid,
    code: String,
    group_id: Uuid,
    buyer_id: Uuid,
    seller_id: Uuid,
    items: Vec<LineItem>,
    subtotal: Money,
    shipping_fee: Money,
    discount: Money,
    total: Money,
    payment_status: PaymentStatus,
    fulfillment_status: FulfillmentStatus,
    payment_method: Option<PaymentMethod>,
    shipping_address: Address,
    tracking_number: Option<String>,
    settlement: Option<Settlement>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    paid_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    version: i64,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineItem { pub material_id: Uuid, pub name: String, pub quantity: u32, pub unit_price: Money, pub total: Money }

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address { pub name: String, pub phone: String, pub street1: String, pub street2: Option<String>, pub city: String, pub province: Option<String>, pub country: String }

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Settlement { pub payout: Money, pub commission: Money, pub settled_at: DateTime<Utc> }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus { #[default] Pending, Paid, Refunded, Voided, Expired }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FulfillmentStatus { #[default] Pending, Processing, Shipped, Delivered, Cancelled }

impl FulfillmentStatus {
    pub fn can_transition_to(self, next: FulfillmentStatus) -> bool {
        use FulfillmentStatus::*;
        matches!(
            (self, next),
            (Pending, Processing) | (Processing, Shipped) | (Shipped, Delivered) | (Pending, Cancelled) | (Processing, Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool { matches!(self, Self::Delivered | Self::Cancelled) }
}

crate::domain::versioned!(Order);

impl Order {
    pub fn create(group_id: Uuid, buyer_id: Uuid, seller_id: Uuid, items: Vec<LineItem>, shipping_fee: Money, shipping_address: Address) -> Result<Self, OrderError> {
        if items.is_empty() { return Err(OrderError::NoItems); }
        let currency = shipping_fee.currency().to_string();
        let subtotal = items.iter().try_fold(Money::zero(&currency), |acc, i| acc.add(&i.total))?;
        let discount = Money::zero(&currency);
        let total = subtotal.add(&shipping_fee)?.subtract(&discount)?;
        let id = Uuid::now_v7();
        let now = Utc::now();
        let mut order = Self {
            id, code: format!("EF-{:08X}", rand::random::<u32>()), group_id, buyer_id, seller_id, items,
            subtotal, shipping_fee, discount, total,
            payment_status: PaymentStatus::Pending, fulfillment_status: FulfillmentStatus::Pending, payment_method: None,
            shipping_address, tracking_number: None, settlement: None,
            created_at: now, updated_at: now, paid_at: None, delivered_at: None, version: 0, events: vec![],
        };
        order.raise_event(OrderEvent::Created { order_id: id, seller_id, total: order.total.amount() });
        Ok(order)
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn code(&self) -> &str { &self.code }
    pub fn group_id(&self) -> Uuid { self.group_id }
    pub fn buyer_id(&self) -> Uuid { self.buyer_id }
    pub fn seller_id(&self) -> Uuid { self.seller_id }
    pub fn items(&self) -> &[LineItem] { &self.items }
    pub fn subtotal(&self) -> &Money { &self.subtotal }
    pub fn shipping_fee(&self) -> &Money { &self.shipping_fee }
    pub fn discount(&self) -> &Money { &self.discount }
    pub fn total(&self) -> &Money { &self.total }
    pub fn payment_status(&self) -> PaymentStatus { self.payment_status }
    pub fn fulfillment_status(&self) -> FulfillmentStatus { self.fulfillment_status }
    pub fn payment_method(&self) -> Option<PaymentMethod> { self.payment_method }
    pub fn shipping_address(&self) -> &Address { &self.shipping_address }
    pub fn tracking_number(&self) -> Option<&str> { self.tracking_number.as_deref() }
    pub fn settlement(&self) -> Option<&Settlement> { self.settlement.as_ref() }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn is_paid(&self) -> bool { self.payment_status == PaymentStatus::Paid }

    pub fn mark_paid(&mut self, method: PaymentMethod) -> Result<(), OrderError> {
        if self.payment_status != PaymentStatus::Pending || self.fulfillment_status != FulfillmentStatus::Pending {
            return Err(OrderError::PaymentNotPending(self.payment_status));
        }
        self.payment_status = PaymentStatus::Paid;
        self.payment_method = Some(method);
        self.paid_at = Some(Utc::now());
        self.touch();
        self.raise_event(OrderEvent::Paid { order_id: self.id });
        Ok(())
    }

    /// Moves fulfillment forward one step. `tracking_number` is kept when
    /// shipping.
    pub fn advance(&mut self, next: FulfillmentStatus, tracking_number: Option<String>) -> Result<(), OrderError> {
        match next {
            FulfillmentStatus::Processing => self.start_processing(),
            FulfillmentStatus::Shipped => self.ship(tracking_number),
            FulfillmentStatus::Delivered => self.deliver(),
            FulfillmentStatus::Pending | FulfillmentStatus::Cancelled => Err(self.invalid(next)),
        }
    }

    pub fn start_processing(&mut self) -> Result<(), OrderError> {
        self.transition(FulfillmentStatus::Processing)?;
        self.raise_event(OrderEvent::Processing { order_id: self.id });
        Ok(())
    }

    pub fn ship(&mut self, tracking_number: Option<String>) -> Result<(), OrderError> {
        self.transition(FulfillmentStatus::Shipped)?;
        self.tracking_number = tracking_number.filter(|t| !t.trim().is_empty());
        self.raise_event(OrderEvent::Shipped { order_id: self.id, tracking: self.tracking_number.clone() });
        Ok(())
    }

    pub fn deliver(&mut self) -> Result<(), OrderError> {
        self.transition(FulfillmentStatus::Delivered)?;
        self.delivered_at = Some(Utc::now());
        self.raise_event(OrderEvent::Delivered { order_id: self.id });
        Ok(())
    }

    /// Cancels before shipment. Returns whether the buyer must be refunded.
    pub fn cancel(&mut self) -> Result<bool, OrderError> {
        if !self.fulfillment_status.can_transition_to(FulfillmentStatus::Cancelled) {
            return Err(OrderError::NotCancellable(self.fulfillment_status));
        }
        let refund = self.payment_status == PaymentStatus::Paid;
        self.payment_status = if refund { PaymentStatus::Refunded } else { PaymentStatus::Voided };
        self.fulfillment_status = FulfillmentStatus::Cancelled;
        self.touch();
        self.raise_event(OrderEvent::Cancelled { order_id: self.id, refunded: refund });
        Ok(refund)
    }

    /// Closes an order whose checkout session lapsed unpaid.
    pub fn expire(&mut self) -> Result<(), OrderError> {
        if self.payment_status != PaymentStatus::Pending { return Err(OrderError::PaymentNotPending(self.payment_status)); }
        if self.fulfillment_status != FulfillmentStatus::Pending { return Err(self.invalid(FulfillmentStatus::Cancelled)); }
        self.payment_status = PaymentStatus::Expired;
        self.fulfillment_status = FulfillmentStatus::Cancelled;
        self.touch();
        self.raise_event(OrderEvent::Expired { order_id: self.id });
        Ok(())
    }

    pub fn record_settlement(&mut self, payout: Money, commission: Money) -> Result<(), OrderError> {
        if self.fulfillment_status != FulfillmentStatus::Delivered { return Err(OrderError::NotDelivered); }
        if self.settlement.is_some() { return Err(OrderError::AlreadySettled); }
        let (payout_amount, commission_amount): (Decimal, Decimal) = (payout.amount(), commission.amount());
        self.settlement = Some(Settlement { payout, commission, settled_at: Utc::now() });
        self.touch();
        self.raise_event(OrderEvent::Settled { order_id: self.id, seller_id: self.seller_id, payout: payout_amount, commission: commission_amount });
        Ok(())
    }

    fn transition(&mut self, next: FulfillmentStatus) -> Result<(), OrderError> {
        if !self.fulfillment_status.can_transition_to(next) { return Err(self.invalid(next)); }
        if next == FulfillmentStatus::Processing && !self.is_paid() { return Err(OrderError::NotPaid); }
        self.fulfillment_status = next;
        self.touch();
        Ok(())
    }

    fn invalid(&self, to: FulfillmentStatus) -> OrderError { OrderError::InvalidTransition { from: self.fulfillment_status, to } }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: OrderEvent) { self.events.push(DomainEvent::Order(e)); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderError {
    #[error("order has no items")]
    NoItems,
    #[error("order amounts: {0}")]
    Amount(#[from] MoneyError),
    #[error("cannot move order from {from:?} to {to:?}")]
    InvalidTransition { from: FulfillmentStatus, to: FulfillmentStatus },
    #[error("order must be paid before processing")]
    NotPaid,
    #[error("order payment is {0:?}, not pending")]
    PaymentNotPending(PaymentStatus),
    #[error("order cannot be cancelled once {0:?}")]
    NotCancellable(FulfillmentStatus),
    #[error("order is not delivered")]
    NotDelivered,
    #[error("order already settled")]
    AlreadySettled,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(qty: u32, price: i64) -> LineItem {
        let unit_price = Money::vnd(Decimal::new(price, 0));
        LineItem { material_id: Uuid::new_v4(), name: "Recycled denim".into(), quantity: qty, total: unit_price.multiply(qty).unwrap(), unit_price }
    }

    fn order() -> Order {
        Order::create(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), vec![line(2, 10), line(1, 5)], Money::vnd(Decimal::new(3, 0)), Address::default()).unwrap()
    }

    #[test]
    fn test_totals() {
        let o = order();
        assert_eq!(o.subtotal().amount(), Decimal::new(25, 0));
        assert_eq!(o.total().amount(), Decimal::new(28, 0));
        assert!(o.code().starts_with("EF-"));
    }

    #[test]
    fn test_requires_items() {
        let r = Order::create(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), vec![], Money::vnd(Decimal::ZERO), Address::default());
        assert_eq!(r.unwrap_err(), OrderError::NoItems);
    }

    #[test]
    fn test_order_workflow() {
        let mut o = order();
        o.mark_paid(PaymentMethod::Wallet).unwrap();
        o.advance(FulfillmentStatus::Processing, None).unwrap();
        o.advance(FulfillmentStatus::Shipped, Some("GHN123".into())).unwrap();
        assert_eq!(o.tracking_number(), Some("GHN123"));
        o.advance(FulfillmentStatus::Delivered, None).unwrap();
        assert_eq!(o.fulfillment_status(), FulfillmentStatus::Delivered);
        assert_eq!(o.take_events().len(), 5);
    }

    #[test]
    fn test_processing_requires_payment() {
        let mut o = order();
        assert_eq!(o.start_processing(), Err(OrderError::NotPaid));
    }

    #[test]
    fn test_rejects_skipping_steps() {
        let mut o = order();
        o.mark_paid(PaymentMethod::VnPay).unwrap();
        assert_eq!(
            o.advance(FulfillmentStatus::Delivered, None),
            Err(OrderError::InvalidTransition { from: FulfillmentStatus::Pending, to: FulfillmentStatus::Delivered })
        );
        assert!(o.advance(FulfillmentStatus::Pending, None).is_err());
    }

    #[test]
    fn test_mark_paid_only_once() {
        let mut o = order();
        o.mark_paid(PaymentMethod::Wallet).unwrap();
        assert_eq!(o.mark_paid(PaymentMethod::Wallet), Err(OrderError::PaymentNotPending(PaymentStatus::Paid)));
    }

    #[test]
    fn test_cancel_paid_order_requires_refund() {
        let mut o = order();
        o.mark_paid(PaymentMethod::Wallet).unwrap();
        o.start_processing().unwrap();
        assert_eq!(o.cancel(), Ok(true));
        assert_eq!(o.payment_status(), PaymentStatus::Refunded);
    }

    #[test]
    fn test_cancel_unpaid_voids() {
        let mut o = order();
        assert_eq!(o.cancel(), Ok(false));
        assert_eq!(o.payment_status(), PaymentStatus::Voided);
        assert_eq!(o.cancel(), Err(OrderError::NotCancellable(FulfillmentStatus::Cancelled)));
    }

    #[test]
    fn test_cannot_cancel_after_shipping() {
        let mut o = order();
        o.mark_paid(PaymentMethod::Wallet).unwrap();
        o.start_processing().unwrap();
        o.ship(None).unwrap();
        assert_eq!(o.cancel(), Err(OrderError::NotCancellable(FulfillmentStatus::Shipped)));
    }

    #[test]
    fn test_expire_only_unpaid() {
        let mut o = order();
        o.expire().unwrap();
        assert_eq!(o.payment_status(), PaymentStatus::Expired);
        assert_eq!(o.fulfillment_status(), FulfillmentStatus::Cancelled);

        let mut paid = order();
        paid.mark_paid(PaymentMethod::Wallet).unwrap();
        assert!(paid.expire().is_err());
    }

    #[test]
    fn test_settlement_once_after_delivery() {
        let mut o = order();
        let payout = Money::vnd(Decimal::new(25, 0));
        let fee = Money::vnd(Decimal::new(3, 0));
        assert_eq!(o.record_settlement(payout.clone(), fee.clone()), Err(OrderError::NotDelivered));
        o.mark_paid(PaymentMethod::Wallet).unwrap();
        o.start_processing().unwrap();
        o.ship(None).unwrap();
        o.deliver().unwrap();
        o.record_settlement(payout.clone(), fee.clone()).unwrap();
        assert_eq!(o.record_settlement(payout, fee), Err(OrderError::AlreadySettled));
    }
}
