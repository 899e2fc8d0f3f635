//! EcoFashion Commerce - marketplace checkout and settlement service
//!
//! Connects fashion designers, material suppliers and customers.
//!
//! ## Features
//! - Material listings with stock reservation
//! - One active cart per user
//! - Multi-seller checkout: one order per seller, grouped per session
//! - Wallet and VNPay payment with idempotent callbacks
//! - Fulfillment tracking and seller settlement on delivery

use rust_decimal::Decimal;
use thiserror::Error;

pub mod api;
pub mod config;
pub mod domain;
pub mod payments;
pub mod publisher;
pub mod services;
pub mod store;

use domain::aggregates::{CartError, GroupError, MaterialError, OrderError, PaymentError, WalletError};
use domain::value_objects::{IdempotencyKeyError, MoneyError};
use payments::VnPayError;
use store::StoreError;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum MarketplaceError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("forbidden: {0}")]
    Forbidden(&'static str),

    #[error("{0}")]
    Validation(String),

    #[error("cart is empty")]
    EmptyCart,

    #[error("paid amount {received} does not match expected {expected}")]
    AmountMismatch { expected: Decimal, received: Decimal },

    #[error("payment gateway is not configured")]
    GatewayUnavailable,

    #[error(transparent)]
    Material(#[from] MaterialError),

    #[error(transparent)]
    Cart(#[from] CartError),

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Group(#[from] GroupError),

    #[error(transparent)]
    Wallet(#[from] WalletError),

    #[error(transparent)]
    Payment(#[from] PaymentError),

    #[error("{0}")]
    Money(#[from] MoneyError),

    #[error("{0}")]
    IdempotencyKey(#[from] IdempotencyKeyError),

    #[error("payment gateway: {0}")]
    Gateway(#[from] VnPayError),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, MarketplaceError>;
