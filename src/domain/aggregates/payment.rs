//! Payment Aggregate
//!
//! One attempt to collect money for a checkout session or a wallet top-up.
//! For gateway payments the id doubles as the merchant transaction reference,
//! so callbacks find their attempt directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::events::{DomainEvent, PaymentEvent};
use crate::domain::value_objects::Money;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Payment {
    id: Uuid,
    user_id: Uuid,
    purpose: PaymentPurpose,
    method: PaymentMethod,
    amount: Money,
    status: PaymentState,
    receipt: Option<GatewayReceipt>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    version: i64,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentMethod { Wallet, VnPay }

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum PaymentPurpose {
    OrderGroup { group_id: Uuid },
    WalletDeposit { wallet_id: Uuid, transaction_id: Uuid },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentState { #[default] Pending, Success, Fail }

/// What the gateway reported about the attempt.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayReceipt {
    pub transaction_no: Option<String>,
    pub response_code: Option<String>,
    pub bank_code: Option<String>,
}

crate::domain::versioned!(Payment);

impl Payment {
    pub fn initiate(user_id: Uuid, purpose: PaymentPurpose, method: PaymentMethod, amount: Money) -> Self {
        Self {
            id: Uuid::now_v7(), user_id, purpose, method, amount, status: PaymentState::Pending, receipt: None,
            created_at: Utc::now(), completed_at: None, version: 0, events: vec![],
        }
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn user_id(&self) -> Uuid { self.user_id }
    pub fn purpose(&self) -> PaymentPurpose { self.purpose }
    pub fn method(&self) -> PaymentMethod { self.method }
    pub fn amount(&self) -> &Money { &self.amount }
    pub fn status(&self) -> PaymentState { self.status }
    pub fn receipt(&self) -> Option<&GatewayReceipt> { self.receipt.as_ref() }
    pub fn is_pending(&self) -> bool { self.status == PaymentState::Pending }

    pub fn succeed(&mut self, receipt: GatewayReceipt) -> Result<(), PaymentError> {
        self.complete(PaymentState::Success, receipt)?;
        self.raise_event(PaymentEvent::Succeeded { payment_id: self.id, amount: self.amount.amount() });
        Ok(())
    }

    pub fn fail(&mut self, receipt: GatewayReceipt) -> Result<(), PaymentError> {
        let response_code = receipt.response_code.clone();
        self.complete(PaymentState::Fail, receipt)?;
        self.raise_event(PaymentEvent::Failed { payment_id: self.id, response_code });
        Ok(())
    }

    fn complete(&mut self, status: PaymentState, receipt: GatewayReceipt) -> Result<(), PaymentError> {
        if !self.is_pending() { return Err(PaymentError::AlreadyCompleted(self.status)); }
        self.status = status;
        self.receipt = Some(receipt);
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: PaymentEvent) { self.events.push(DomainEvent::Payment(e)); }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PaymentError {
    #[error("payment already completed as {0:?}")]
    AlreadyCompleted(PaymentState),
}
