//! Order Group Aggregate
//!
//! The record of one checkout session: the sibling orders it produced and
//! the amount the buyer owes for all of them together.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::events::{CheckoutEvent, DomainEvent};
use crate::domain::value_objects::{IdempotencyKey, Money};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrderGroup {
    id: Uuid,
    buyer_id: Uuid,
    idempotency_key: IdempotencyKey,
    order_ids: Vec<Uuid>,
    total: Money,
    status: GroupStatus,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i64,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupStatus { #[default] PendingPayment, Paid, Expired, Cancelled }

crate::domain::versioned!(OrderGroup);

impl OrderGroup {
    pub fn open(id: Uuid, buyer_id: Uuid, idempotency_key: IdempotencyKey, order_ids: Vec<Uuid>, total: Money, payment_window: Duration) -> Self {
        let now = Utc::now();
        let mut group = Self {
            id, buyer_id, idempotency_key, order_ids, total, status: GroupStatus::PendingPayment,
            expires_at: now + payment_window, created_at: now, updated_at: now, version: 0, events: vec![],
        };
        group.raise_event(CheckoutEvent::SessionCreated { group_id: id, buyer_id, order_ids: group.order_ids.clone(), total: group.total.amount() });
        group
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn buyer_id(&self) -> Uuid { self.buyer_id }
    pub fn idempotency_key(&self) -> &IdempotencyKey { &self.idempotency_key }
    pub fn order_ids(&self) -> &[Uuid] { &self.order_ids }
    pub fn total(&self) -> &Money { &self.total }
    pub fn status(&self) -> GroupStatus { self.status }
    pub fn expires_at(&self) -> DateTime<Utc> { self.expires_at }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool { self.status == GroupStatus::PendingPayment && now >= self.expires_at }

    /// Payment may be taken only while the session is open and within its window.
    pub fn ensure_payable(&self, now: DateTime<Utc>) -> Result<(), GroupError> {
        if self.status != GroupStatus::PendingPayment { return Err(GroupError::NotPayable(self.status)); }
        if now >= self.expires_at { return Err(GroupError::Expired); }
        Ok(())
    }

    pub fn mark_paid(&mut self, now: DateTime<Utc>) -> Result<(), GroupError> {
        self.ensure_payable(now)?;
        self.status = GroupStatus::Paid;
        self.touch();
        self.raise_event(CheckoutEvent::SessionPaid { group_id: self.id });
        Ok(())
    }

    pub fn expire(&mut self) -> Result<(), GroupError> {
        if self.status != GroupStatus::PendingPayment { return Err(GroupError::NotPayable(self.status)); }
        self.status = GroupStatus::Expired;
        self.touch();
        self.raise_event(CheckoutEvent::SessionExpired { group_id: self.id });
        Ok(())
    }

    /// Called once every sibling order is cancelled.
    pub fn cancel(&mut self) {
        if self.status == GroupStatus::Cancelled { return; }
        self.status = GroupStatus::Cancelled;
        self.touch();
        self.raise_event(CheckoutEvent::SessionCancelled { group_id: self.id });
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: CheckoutEvent) { self.events.push(DomainEvent::Checkout(e)); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GroupError {
    #[error("checkout session is {0:?}")]
    NotPayable(GroupStatus),
    #[error("checkout session payment window has closed")]
    Expired,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn group(window_minutes: i64) -> OrderGroup {
        OrderGroup::open(
            Uuid::now_v7(), Uuid::new_v4(), IdempotencyKey::new("k-1").unwrap(),
            vec![Uuid::new_v4(), Uuid::new_v4()], Money::vnd(Decimal::new(500, 0)), Duration::minutes(window_minutes),
        )
    }

    #[test]
    fn test_payable_within_window() {
        let mut g = group(15);
        assert!(g.ensure_payable(Utc::now()).is_ok());
        g.mark_paid(Utc::now()).unwrap();
        assert_eq!(g.status(), GroupStatus::Paid);
        assert_eq!(g.mark_paid(Utc::now()), Err(GroupError::NotPayable(GroupStatus::Paid)));
        assert_eq!(g.take_events().len(), 2);
    }

    #[test]
    fn test_window_lapses() {
        let mut g = group(15);
        let later = Utc::now() + Duration::minutes(16);
        assert!(g.is_expired(later));
        assert_eq!(g.ensure_payable(later), Err(GroupError::Expired));
        g.expire().unwrap();
        assert!(!g.is_expired(later));
        assert_eq!(g.expire(), Err(GroupError::NotPayable(GroupStatus::Expired)));
    }
}
