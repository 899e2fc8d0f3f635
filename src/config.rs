//! Service configuration from the environment.

use std::str::FromStr;

use rust_decimal::Decimal;
use thiserror::Error;

use crate::payments::VnPayConfig;

const DEFAULT_VNPAY_URL: &str = "https://sandbox.vnpayment.vn/paymentv2/vpcpay.html";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
    #[error("{0} must be set when {1} is set")]
    Missing(&'static str, &'static str),
}

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub nats_url: Option<String>,
    pub commerce: CommerceSettings,
    pub vnpay: Option<VnPayConfig>,
    pub expiry_sweep: std::time::Duration,
}

/// Business rules shared by the services.
#[derive(Clone, Debug)]
pub struct CommerceSettings {
    pub currency: String,
    pub shipping_fee_per_seller: Decimal,
    pub commission_rate: Decimal,
    pub payment_window: chrono::Duration,
}

impl Default for CommerceSettings {
    fn default() -> Self {
        Self {
            currency: "VND".to_string(),
            shipping_fee_per_seller: Decimal::new(30_000, 0),
            commission_rate: Decimal::new(10, 2),
            payment_window: chrono::Duration::minutes(15),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = CommerceSettings::default();

        let commission_rate = parse_or(&var, "PLATFORM_COMMISSION_RATE", defaults.commission_rate)?;
        if commission_rate < Decimal::ZERO || commission_rate >= Decimal::ONE {
            return Err(ConfigError::Invalid { key: "PLATFORM_COMMISSION_RATE", value: commission_rate.to_string() });
        }
        let shipping_fee_per_seller = parse_or(&var, "SHIPPING_FEE_PER_SELLER", defaults.shipping_fee_per_seller)?;
        if shipping_fee_per_seller < Decimal::ZERO {
            return Err(ConfigError::Invalid { key: "SHIPPING_FEE_PER_SELLER", value: shipping_fee_per_seller.to_string() });
        }
        let window_minutes: i64 = parse_or(&var, "PAYMENT_WINDOW_MINUTES", 15)?;
        if window_minutes <= 0 {
            return Err(ConfigError::Invalid { key: "PAYMENT_WINDOW_MINUTES", value: window_minutes.to_string() });
        }
        let sweep_seconds: u64 = parse_or(&var, "EXPIRY_SWEEP_SECONDS", 60)?;
        if sweep_seconds == 0 {
            return Err(ConfigError::Invalid { key: "EXPIRY_SWEEP_SECONDS", value: "0".to_string() });
        }

        let commerce = CommerceSettings {
            currency: var("CURRENCY").unwrap_or(defaults.currency),
            shipping_fee_per_seller,
            commission_rate,
            payment_window: chrono::Duration::minutes(window_minutes),
        };

        let vnpay = match (var("VNPAY_TMN_CODE"), var("VNPAY_HASH_SECRET")) {
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing("VNPAY_HASH_SECRET", "VNPAY_TMN_CODE")),
            (None, Some(_)) => return Err(ConfigError::Missing("VNPAY_TMN_CODE", "VNPAY_HASH_SECRET")),
            (Some(tmn_code), Some(hash_secret)) => Some(VnPayConfig {
                tmn_code,
                hash_secret,
                payment_url: var("VNPAY_PAYMENT_URL").unwrap_or_else(|| DEFAULT_VNPAY_URL.to_string()),
                return_url: var("VNPAY_RETURN_URL").ok_or(ConfigError::Missing("VNPAY_RETURN_URL", "VNPAY_TMN_CODE"))?,
                locale: var("VNPAY_LOCALE").unwrap_or_else(|| "vn".to_string()),
                expire_after: commerce.payment_window,
            }),
        };

        Ok(Self {
            port: parse_or(&var, "PORT", 8083)?,
            database_url: var("DATABASE_URL"),
            database_max_connections: parse_or(&var, "DATABASE_MAX_CONNECTIONS", 10)?,
            nats_url: var("NATS_URL"),
            commerce,
            vnpay,
            expiry_sweep: std::time::Duration::from_secs(sweep_seconds),
        })
    }
}

fn parse_or<T: FromStr>(var: &impl Fn(&str) -> Option<String>, key: &'static str, default: T) -> Result<T, ConfigError> {
    match var(key) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid { key, value }),
    }
}
