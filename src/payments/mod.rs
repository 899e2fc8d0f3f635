//! External payment gateways
pub mod vnpay;

pub use vnpay::{IpnResponse, PaymentRequest, VnPayCallback, VnPayClient, VnPayConfig, VnPayError};
