//! VNPay gateway: signed redirect URLs and callback verification.
//!
//! Every request and callback is a flat set of `vnp_*` query parameters.
//! The signature is an HMAC-SHA512 over the parameters sorted by name,
//! form-url-encoded and joined with `&`, excluding the hash fields
//! themselves.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use sha2::Sha512;
use thiserror::Error;
use url::form_urlencoded;

type HmacSha512 = Hmac<Sha512>;

pub const API_VERSION: &str = "2.1.0";
pub const SUCCESS_CODE: &str = "00";
const SECURE_HASH: &str = "vnp_SecureHash";
const SECURE_HASH_TYPE: &str = "vnp_SecureHashType";
const DATE_FORMAT: &str = "%Y%m%d%H%M%S";

/// VNPay timestamps are local Vietnam time (GMT+7).
fn gateway_offset() -> Duration { Duration::hours(7) }

#[derive(Clone, Debug)]
pub struct VnPayConfig {
    pub tmn_code: String,
    pub hash_secret: String,
    pub payment_url: String,
    pub return_url: String,
    pub locale: String,
    pub expire_after: Duration,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VnPayError {
    #[error("invalid signature")]
    InvalidSignature,
    #[error("missing parameter {0}")]
    MissingField(&'static str),
    #[error("invalid value for {field}: {value}")]
    InvalidField { field: &'static str, value: String },
    #[error("amount must be positive with at most two decimal places")]
    InvalidAmount,
    #[error("hash secret rejected by HMAC")]
    InvalidKey,
}

/// A redirect to build for one payment attempt.
#[derive(Clone, Debug)]
pub struct PaymentRequest {
    pub txn_ref: String,
    pub amount: Decimal,
    pub order_info: String,
    pub ip_addr: String,
    pub created_at: DateTime<Utc>,
    /// Hard deadline of what is being paid for. The link expires at this
    /// time when it comes before the configured lifetime.
    pub deadline: Option<DateTime<Utc>>,
}

/// A verified return or IPN callback.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VnPayCallback {
    pub txn_ref: String,
    pub amount: Decimal,
    pub response_code: String,
    pub transaction_status: Option<String>,
    pub transaction_no: Option<String>,
    pub bank_code: Option<String>,
    pub pay_date: Option<DateTime<Utc>>,
}

impl VnPayCallback {
    pub fn is_success(&self) -> bool {
        self.response_code == SUCCESS_CODE && self.transaction_status.as_deref() == Some(SUCCESS_CODE)
    }
}

/// Body VNPay expects back from the IPN endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IpnResponse { Confirmed, OrderNotFound, AlreadyConfirmed, InvalidAmount, InvalidSignature, UnknownError }

impl IpnResponse {
    pub fn code(self) -> &'static str {
        match self {
            Self::Confirmed => "00",
            Self::OrderNotFound => "01",
            Self::AlreadyConfirmed => "02",
            Self::InvalidAmount => "04",
            Self::InvalidSignature => "97",
            Self::UnknownError => "99",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Self::Confirmed => "Confirm Success",
            Self::OrderNotFound => "Order not found",
            Self::AlreadyConfirmed => "Order already confirmed",
            Self::InvalidAmount => "Invalid amount",
            Self::InvalidSignature => "Invalid signature",
            Self::UnknownError => "Unknown error",
        }
    }
}

impl Serialize for IpnResponse {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("IpnResponse", 2)?;
        s.serialize_field("RspCode", self.code())?;
        s.serialize_field("Message", self.message())?;
        s.end()
    }
}

#[derive(Clone, Debug)]
pub struct VnPayClient { config: VnPayConfig }

impl VnPayClient {
    pub fn new(config: VnPayConfig) -> Self { Self { config } }

    pub fn create_payment_url(&self, request: &PaymentRequest) -> Result<String, VnPayError> {
        let mut params = BTreeMap::new();
        params.insert("vnp_Version".to_string(), API_VERSION.to_string());
        params.insert("vnp_Command".to_string(), "pay".to_string());
        params.insert("vnp_TmnCode".to_string(), self.config.tmn_code.clone());
        params.insert("vnp_Amount".to_string(), to_gateway_amount(request.amount)?.to_string());
        params.insert("vnp_CurrCode".to_string(), "VND".to_string());
        params.insert("vnp_TxnRef".to_string(), request.txn_ref.clone());
        params.insert("vnp_OrderInfo".to_string(), request.order_info.clone());
        params.insert("vnp_OrderType".to_string(), "other".to_string());
        params.insert("vnp_Locale".to_string(), self.config.locale.clone());
        params.insert("vnp_ReturnUrl".to_string(), self.config.return_url.clone());
        params.insert("vnp_IpAddr".to_string(), request.ip_addr.clone());
        params.insert("vnp_CreateDate".to_string(), format_gateway_date(request.created_at));
        let expires_at = request.created_at + self.config.expire_after;
        let expires_at = request.deadline.map_or(expires_at, |d| d.min(expires_at));
        params.insert("vnp_ExpireDate".to_string(), format_gateway_date(expires_at));

        let query = canonical_query(&params);
        let hash = self.sign(&query)?;
        Ok(format!("{}?{}&{}={}", self.config.payment_url, query, SECURE_HASH, hash))
    }

    /// Checks the signature of a return/IPN callback and parses it. An
    /// unsigned callback is treated as a bad signature.
    pub fn verify(&self, params: &HashMap<String, String>) -> Result<VnPayCallback, VnPayError> {
        let provided = params.get(SECURE_HASH).filter(|h| !h.is_empty()).ok_or(VnPayError::InvalidSignature)?;
        let signed: BTreeMap<String, String> = params
            .iter()
            .filter(|(k, _)| k.starts_with("vnp_") && k.as_str() != SECURE_HASH && k.as_str() != SECURE_HASH_TYPE)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let expected = self.sign(&canonical_query(&signed))?;
        if !constant_time_eq(&expected, &provided.to_ascii_lowercase()) {
            return Err(VnPayError::InvalidSignature);
        }

        let field = |name: &'static str| signed.get(name).filter(|v| !v.is_empty()).cloned();
        let txn_ref = field("vnp_TxnRef").ok_or(VnPayError::MissingField("vnp_TxnRef"))?;
        let raw_amount = field("vnp_Amount").ok_or(VnPayError::MissingField("vnp_Amount"))?;
        let amount = raw_amount
            .parse::<i64>()
            .map(|minor| Decimal::new(minor, 2))
            .map_err(|_| VnPayError::InvalidField { field: "vnp_Amount", value: raw_amount.clone() })?;
        let response_code = field("vnp_ResponseCode").ok_or(VnPayError::MissingField("vnp_ResponseCode"))?;
        let pay_date = field("vnp_PayDate").map(|d| parse_gateway_date(&d)).transpose()?;

        Ok(VnPayCallback {
            txn_ref,
            amount: amount.normalize(),
            response_code,
            transaction_status: field("vnp_TransactionStatus"),
            transaction_no: field("vnp_TransactionNo"),
            bank_code: field("vnp_BankCode"),
            pay_date,
        })
    }

    /// Signs an already-canonical parameter set.
    pub fn sign_params(&self, params: &BTreeMap<String, String>) -> Result<String, VnPayError> {
        self.sign(&canonical_query(params))
    }

    fn sign(&self, data: &str) -> Result<String, VnPayError> {
        let mut mac = HmacSha512::new_from_slice(self.config.hash_secret.as_bytes()).map_err(|_| VnPayError::InvalidKey)?;
        mac.update(data.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

/// `k=v&k=v` over non-empty values, keys in ordinal order.
pub fn canonical_query(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, v)| format!("{}={}", encode(k), encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn encode(s: &str) -> String { form_urlencoded::byte_serialize(s.as_bytes()).collect() }

fn to_gateway_amount(amount: Decimal) -> Result<i64, VnPayError> {
    let minor = amount.checked_mul(Decimal::ONE_HUNDRED).ok_or(VnPayError::InvalidAmount)?;
    if minor <= Decimal::ZERO || minor.fract() != Decimal::ZERO { return Err(VnPayError::InvalidAmount); }
    minor.to_i64().ok_or(VnPayError::InvalidAmount)
}

fn format_gateway_date(at: DateTime<Utc>) -> String { (at + gateway_offset()).format(DATE_FORMAT).to_string() }

fn parse_gateway_date(value: &str) -> Result<DateTime<Utc>, VnPayError> {
    let local = NaiveDateTime::parse_from_str(value, DATE_FORMAT)
        .map_err(|_| VnPayError::InvalidField { field: "vnp_PayDate", value: value.to_string() })?;
    Ok(Utc.from_utc_datetime(&(local - gateway_offset())))
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() { return false; }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) { res |= x ^ y; }
    res == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> VnPayClient {
        VnPayClient::new(VnPayConfig {
            tmn_code: "DEMOTMN1".into(),
            hash_secret: "SECRETKEY123".into(),
            payment_url: "https://sandbox.vnpayment.vn/paymentv2/vpcpay.html".into(),
            return_url: "https://shop.example/payments/vnpay/return".into(),
            locale: "vn".into(),
            expire_after: Duration::minutes(15),
        })
    }

    fn query_map(url: &str) -> HashMap<String, String> {
        url::Url::parse(url).unwrap().query_pairs().into_owned().collect()
    }

    fn signed_callback(client: &VnPayClient, pairs: &[(&str, &str)]) -> HashMap<String, String> {
        let params: BTreeMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        let hash = client.sign_params(&params).unwrap();
        let mut out: HashMap<String, String> = params.into_iter().collect();
        out.insert(SECURE_HASH.into(), hash.to_uppercase());
        out.insert(SECURE_HASH_TYPE.into(), "HmacSHA512".into());
        out
    }

    #[test]
    fn test_known_signature() {
        let params: BTreeMap<String, String> = [
            ("vnp_Amount", "10000000"), ("vnp_Command", "pay"), ("vnp_CreateDate", "20240105103000"),
            ("vnp_CurrCode", "VND"), ("vnp_IpAddr", "127.0.0.1"), ("vnp_Locale", "vn"),
            ("vnp_OrderInfo", "Thanh toan don hang EF-1"), ("vnp_OrderType", "other"),
            ("vnp_ReturnUrl", "https://shop.example/payments/vnpay/return"), ("vnp_TmnCode", "DEMOTMN1"),
            ("vnp_TxnRef", "abc123"), ("vnp_Version", "2.1.0"),
        ].iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        assert!(canonical_query(&params).contains("vnp_OrderInfo=Thanh+toan+don+hang+EF-1"));
        assert!(canonical_query(&params).contains("vnp_ReturnUrl=https%3A%2F%2Fshop.example%2Fpayments%2Fvnpay%2Freturn"));
        assert_eq!(
            client().sign_params(&params).unwrap(),
            "eec6d8f63a47cdddf636b8f66258a591b36fc653c2ed3bdef4c25c9a775558e1c1d2866532aafbb3698875c7410e0e246ea667c6b70f8dbc194a5553e2d49cd4"
        );
    }

    #[test]
    fn test_payment_url_round_trips_through_verify() {
        let c = client();
        let created_at = Utc.with_ymd_and_hms(2024, 1, 5, 3, 30, 0).unwrap();
        let url = c.create_payment_url(&PaymentRequest {
            txn_ref: "abc123".into(), amount: Decimal::new(100_000, 0), order_info: "Thanh toan don hang EF-1".into(),
            ip_addr: "127.0.0.1".into(), created_at, deadline: None,
        }).unwrap();
        let mut params = query_map(&url);
        assert_eq!(params["vnp_Amount"], "10000000");
        assert_eq!(params["vnp_CreateDate"], "20240105103000");
        assert_eq!(params["vnp_ExpireDate"], "20240105104500");

        // a pay request has no response code; add one the way a callback would, then re-sign
        params.remove(SECURE_HASH);
        params.insert("vnp_ResponseCode".into(), "00".into());
        params.insert("vnp_TransactionStatus".into(), "00".into());
        let pairs: Vec<(String, String)> = params.into_iter().collect();
        let borrowed: Vec<(&str, &str)> = pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        let callback = c.verify(&signed_callback(&c, &borrowed)).unwrap();
        assert_eq!(callback.amount, Decimal::new(100_000, 0));
        assert!(callback.is_success());
    }

    #[test]
    fn test_link_expires_with_deadline() {
        let c = client();
        let created_at = Utc.with_ymd_and_hms(2024, 1, 5, 3, 30, 0).unwrap();
        let url = c.create_payment_url(&PaymentRequest {
            txn_ref: "abc123".into(), amount: Decimal::new(100_000, 0), order_info: "x".into(),
            ip_addr: "127.0.0.1".into(), created_at, deadline: Some(created_at + Duration::minutes(5)),
        }).unwrap();
        assert_eq!(query_map(&url)["vnp_ExpireDate"], "20240105103500");
    }

    #[test]
    fn test_verify_parses_callback() {
        let c = client();
        let params = signed_callback(&c, &[
            ("vnp_TxnRef", "abc123"), ("vnp_Amount", "25000000"), ("vnp_ResponseCode", "00"),
            ("vnp_TransactionStatus", "00"), ("vnp_TransactionNo", "14226112"), ("vnp_BankCode", "NCB"),
            ("vnp_PayDate", "20240105103512"), ("vnp_TmnCode", "DEMOTMN1"),
        ]);
        let cb = c.verify(&params).unwrap();
        assert_eq!(cb.txn_ref, "abc123");
        assert_eq!(cb.amount, Decimal::new(250_000, 0));
        assert_eq!(cb.transaction_no.as_deref(), Some("14226112"));
        assert_eq!(cb.pay_date, Some(Utc.with_ymd_and_hms(2024, 1, 5, 3, 35, 12).unwrap()));
        assert!(cb.is_success());
    }

    #[test]
    fn test_tampered_callback_rejected() {
        let c = client();
        let mut params = signed_callback(&c, &[("vnp_TxnRef", "abc123"), ("vnp_Amount", "100"), ("vnp_ResponseCode", "00")]);
        params.insert("vnp_Amount".into(), "999900".into());
        assert_eq!(c.verify(&params), Err(VnPayError::InvalidSignature));
        params.remove(SECURE_HASH);
        assert_eq!(c.verify(&params), Err(VnPayError::InvalidSignature));
        params.insert(SECURE_HASH.into(), String::new());
        assert_eq!(c.verify(&params), Err(VnPayError::InvalidSignature));
    }

    #[test]
    fn test_non_success_codes() {
        let c = client();
        let declined = signed_callback(&c, &[("vnp_TxnRef", "a"), ("vnp_Amount", "100"), ("vnp_ResponseCode", "24")]);
        assert!(!c.verify(&declined).unwrap().is_success());
        let pending = signed_callback(&c, &[("vnp_TxnRef", "a"), ("vnp_Amount", "100"), ("vnp_ResponseCode", "00"), ("vnp_TransactionStatus", "01")]);
        assert!(!c.verify(&pending).unwrap().is_success());
        let no_status = signed_callback(&c, &[("vnp_TxnRef", "a"), ("vnp_Amount", "100"), ("vnp_ResponseCode", "00")]);
        assert!(!c.verify(&no_status).unwrap().is_success());
    }

    #[test]
    fn test_rejects_fractional_dong() {
        let c = client();
        let err = c.create_payment_url(&PaymentRequest {
            txn_ref: "x".into(), amount: Decimal::new(1005, 3), order_info: "x".into(), ip_addr: "127.0.0.1".into(), created_at: Utc::now(), deadline: None,
        });
        assert_eq!(err, Err(VnPayError::InvalidAmount));
        let overflow = c.create_payment_url(&PaymentRequest {
            txn_ref: "x".into(), amount: Decimal::MAX, order_info: "x".into(), ip_addr: "127.0.0.1".into(), created_at: Utc::now(), deadline: None,
        });
        assert_eq!(overflow, Err(VnPayError::InvalidAmount));
    }

    #[test]
    fn test_ipn_response_body() {
        let json = serde_json::to_value(IpnResponse::AlreadyConfirmed).unwrap();
        assert_eq!(json, serde_json::json!({"RspCode": "02", "Message": "Order already confirmed"}));
    }
}
