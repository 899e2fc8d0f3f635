//! Value Objects for the marketplace

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Money value object
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money { amount: Decimal, currency: String }

impl Money {
    pub fn new(amount: Decimal, currency: &str) -> Self { Self { amount, currency: currency.to_string() } }
    pub fn vnd(amount: Decimal) -> Self { Self::new(amount, "VND") }
    pub fn zero(currency: &str) -> Self { Self::new(Decimal::ZERO, currency) }
    pub fn amount(&self) -> Decimal { self.amount }
    pub fn currency(&self) -> &str { &self.currency }
    pub fn is_zero(&self) -> bool { self.amount.is_zero() }
    pub fn is_negative(&self) -> bool { self.amount.is_sign_negative() && !self.amount.is_zero() }
    pub fn is_positive(&self) -> bool { !self.is_zero() && !self.is_negative() }

    pub fn add(&self, other: &Money) -> Result<Money, MoneyError> {
        if self.currency != other.currency { return Err(MoneyError::CurrencyMismatch); }
        let sum = self.amount.checked_add(other.amount).ok_or(MoneyError::Overflow)?;
        Ok(Money::new(sum, &self.currency))
    }

    pub fn subtract(&self, other: &Money) -> Result<Money, MoneyError> {
        if self.currency != other.currency { return Err(MoneyError::CurrencyMismatch); }
        let diff = self.amount.checked_sub(other.amount).ok_or(MoneyError::Overflow)?;
        Ok(Money::new(diff, &self.currency))
    }

    pub fn multiply(&self, qty: u32) -> Result<Money, MoneyError> {
        let product = self.amount.checked_mul(Decimal::from(qty)).ok_or(MoneyError::Overflow)?;
        Ok(Money::new(product, &self.currency))
    }

    /// Share of this amount at `rate` (0.10 = 10%), rounded to cents.
    pub fn percent(&self, rate: Decimal) -> Money {
        let share = (self.amount * rate).round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        Money::new(share, &self.currency)
    }
}

impl Default for Money { fn default() -> Self { Self::zero("VND") } }

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{} {}", self.amount, self.currency) }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum MoneyError { CurrencyMismatch, Overflow }
impl std::error::Error for MoneyError {}
impl fmt::Display for MoneyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CurrencyMismatch => write!(f, "Currency mismatch"),
            Self::Overflow => write!(f, "Amount out of range"),
        }
    }
}

/// Quantity value object
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quantity(u32);

impl Quantity {
    pub fn new(value: u32) -> Self { Self(value) }
    pub fn value(&self) -> u32 { self.0 }
    pub fn add(&self, other: u32) -> Self { Self(self.0.saturating_add(other)) }
    pub fn subtract(&self, other: u32) -> Option<Self> {
        if other > self.0 { None } else { Some(Self(self.0 - other)) }
    }
    pub fn is_zero(&self) -> bool { self.0 == 0 }
}

/// Client-supplied key that makes checkout session creation safe to retry.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    pub const MAX_LEN: usize = 128;

    pub fn new(value: impl Into<String>) -> Result<Self, IdempotencyKeyError> {
        let value = value.into().trim().to_string();
        if value.is_empty() { return Err(IdempotencyKeyError::Empty); }
        if value.len() > Self::MAX_LEN { return Err(IdempotencyKeyError::TooLong); }
        if !value.chars().all(|c| c.is_ascii_graphic()) { return Err(IdempotencyKeyError::InvalidCharacter); }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum IdempotencyKeyError { Empty, TooLong, InvalidCharacter }
impl std::error::Error for IdempotencyKeyError {}
impl fmt::Display for IdempotencyKeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "idempotency key empty"),
            Self::TooLong => write!(f, "idempotency key longer than {} characters", IdempotencyKey::MAX_LEN),
            Self::InvalidCharacter => write!(f, "idempotency key must be visible ASCII"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn test_money_add() {
        let a = Money::vnd(Decimal::new(100, 0));
        let b = Money::vnd(Decimal::new(50, 0));
        assert_eq!(a.add(&b).unwrap().amount(), Decimal::new(150, 0));
    }
    #[test]
    fn test_money_currency_mismatch() {
        let a = Money::vnd(Decimal::new(100, 0));
        let b = Money::new(Decimal::new(1, 0), "USD");
        assert_eq!(a.subtract(&b), Err(MoneyError::CurrencyMismatch));
    }
    #[test]
    fn test_money_overflow_is_an_error() {
        let max = Money::vnd(Decimal::MAX);
        assert_eq!(max.add(&Money::vnd(Decimal::ONE)), Err(MoneyError::Overflow));
        assert_eq!(max.multiply(2), Err(MoneyError::Overflow));
        assert_eq!(Money::vnd(Decimal::new(120, 0)).multiply(3).unwrap().amount(), Decimal::new(360, 0));
    }
    #[test]
    fn test_percent_rounds_half_away_from_zero() {
        let m = Money::vnd(Decimal::new(12345, 2)); // 123.45
        assert_eq!(m.percent(Decimal::new(1, 1)).amount(), Decimal::new(1235, 2)); // 12.345 -> 12.35
    }
    #[test]
    fn test_sign_checks() {
        assert!(Money::vnd(Decimal::new(-1, 0)).is_negative());
        assert!(!Money::zero("VND").is_negative());
        assert!(!Money::zero("VND").is_positive());
    }
    #[test]
    fn test_quantity_subtract() {
        assert_eq!(Quantity::new(5).subtract(2), Some(Quantity::new(3)));
        assert_eq!(Quantity::new(1).subtract(2), None);
    }
    #[test]
    fn test_idempotency_key() {
        assert_eq!(IdempotencyKey::new("  abc-123 ").unwrap().as_str(), "abc-123");
        assert_eq!(IdempotencyKey::new("   "), Err(IdempotencyKeyError::Empty));
        assert_eq!(IdempotencyKey::new("a b"), Err(IdempotencyKeyError::InvalidCharacter));
        assert_eq!(IdempotencyKey::new("x".repeat(129)), Err(IdempotencyKeyError::TooLong));
    }
}
