//! Wallet Aggregate and its transaction ledger

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::events::{DomainEvent, WalletEvent};
use crate::domain::value_objects::{Money, MoneyError};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Wallet {
    id: Uuid,
    owner_id: Uuid,
    balance: Money,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i64,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

/// Balance before and after one credit or debit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BalanceChange { pub before: Money, pub after: Money }

crate::domain::versioned!(Wallet);

impl Wallet {
    pub fn open(owner_id: Uuid, currency: &str) -> Self {
        let now = Utc::now();
        Self { id: Uuid::now_v7(), owner_id, balance: Money::zero(currency), created_at: now, updated_at: now, version: 0, events: vec![] }
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn owner_id(&self) -> Uuid { self.owner_id }
    pub fn balance(&self) -> &Money { &self.balance }
    pub fn currency(&self) -> &str { self.balance.currency() }

    pub fn credit(&mut self, amount: &Money) -> Result<BalanceChange, WalletError> {
        Self::ensure_positive(amount)?;
        let before = self.balance.clone();
        self.balance = self.balance.add(amount)?;
        self.touch();
        self.raise_event(WalletEvent::Credited { wallet_id: self.id, amount: amount.amount(), balance: self.balance.amount() });
        Ok(BalanceChange { before, after: self.balance.clone() })
    }

    /// Debits or fails without touching the balance.
    pub fn debit(&mut self, amount: &Money) -> Result<BalanceChange, WalletError> {
        Self::ensure_positive(amount)?;
        let after = self.balance.subtract(amount)?;
        if after.is_negative() {
            return Err(WalletError::InsufficientBalance { available: self.balance.amount(), required: amount.amount() });
        }
        let before = std::mem::replace(&mut self.balance, after);
        self.touch();
        self.raise_event(WalletEvent::Debited { wallet_id: self.id, amount: amount.amount(), balance: self.balance.amount() });
        Ok(BalanceChange { before, after: self.balance.clone() })
    }

    fn ensure_positive(amount: &Money) -> Result<(), WalletError> {
        if !amount.is_positive() { return Err(WalletError::NonPositiveAmount); }
        Ok(())
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: WalletEvent) { self.events.push(DomainEvent::Wallet(e)); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WalletError {
    #[error("insufficient balance: {available} available, {required} required")]
    InsufficientBalance { available: Decimal, required: Decimal },
    #[error("amount must be positive")]
    NonPositiveAmount,
    #[error("{0}")]
    Money(#[from] MoneyError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionKind { Deposit, Withdrawal, Payment, Refund, Settlement }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus { #[default] Pending, Success, Fail }

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WalletTransaction {
    id: Uuid,
    wallet_id: Uuid,
    kind: TransactionKind,
    amount: Money,
    balance_before: Option<Money>,
    balance_after: Option<Money>,
    status: TransactionStatus,
    reference: Option<Uuid>,
    description: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl WalletTransaction {
    /// A ledger line for a balance change that already happened.
    pub fn completed(wallet_id: Uuid, kind: TransactionKind, amount: Money, change: BalanceChange, reference: Option<Uuid>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(), wallet_id, kind, amount,
            balance_before: Some(change.before), balance_after: Some(change.after),
            status: TransactionStatus::Success, reference, description: description.into(), created_at: now, updated_at: now,
        }
    }

    /// A ledger line awaiting an external outcome, such as a gateway deposit.
    pub fn pending(wallet_id: Uuid, kind: TransactionKind, amount: Money, reference: Option<Uuid>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(), wallet_id, kind, amount, balance_before: None, balance_after: None,
            status: TransactionStatus::Pending, reference, description: description.into(), created_at: now, updated_at: now,
        }
    }

    pub fn with_reference(mut self, reference: Uuid) -> Self {
        self.reference = Some(reference);
        self
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn wallet_id(&self) -> Uuid { self.wallet_id }
    pub fn kind(&self) -> TransactionKind { self.kind }
    pub fn amount(&self) -> &Money { &self.amount }
    pub fn status(&self) -> TransactionStatus { self.status }
    pub fn reference(&self) -> Option<Uuid> { self.reference }
    pub fn balance_after(&self) -> Option<&Money> { self.balance_after.as_ref() }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }

    pub fn succeed(&mut self, change: BalanceChange) {
        self.balance_before = Some(change.before);
        self.balance_after = Some(change.after);
        self.status = TransactionStatus::Success;
        self.updated_at = Utc::now();
    }

    pub fn fail(&mut self) {
        self.status = TransactionStatus::Fail;
        self.updated_at = Utc::now();
    }
}
