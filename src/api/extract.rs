//! Request extractors for the acting user and gateway metadata.

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::domain::value_objects::IdempotencyKey;
use crate::MarketplaceError;

pub const USER_HEADER: &str = "x-user-id";
pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts.headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim).filter(|v| !v.is_empty())
}

/// The user a request acts for, from `X-User-Id`. Identity is established
/// upstream; this service trusts the header.
#[derive(Clone, Copy, Debug)]
pub struct ActingUser(pub Uuid);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ActingUser {
    type Rejection = MarketplaceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = header(parts, USER_HEADER).ok_or_else(|| MarketplaceError::Validation("X-User-Id header is required".into()))?;
        Uuid::parse_str(raw)
            .map(ActingUser)
            .map_err(|_| MarketplaceError::Validation("X-User-Id must be a UUID".into()))
    }
}

/// `Idempotency-Key` header, required where a retried request must not
/// repeat its effect.
#[derive(Clone, Debug)]
pub struct IdempotencyHeader(pub IdempotencyKey);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for IdempotencyHeader {
    type Rejection = MarketplaceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = header(parts, IDEMPOTENCY_HEADER).ok_or_else(|| MarketplaceError::Validation("Idempotency-Key header is required".into()))?;
        Ok(IdempotencyHeader(IdempotencyKey::new(raw)?))
    }
}

/// Best-effort client address for the gateway: first `X-Forwarded-For` hop,
/// then `X-Real-IP`, else loopback.
#[derive(Clone, Debug)]
pub struct ClientIp(pub String);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ClientIp {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let forwarded = header(parts, "x-forwarded-for").and_then(|v| v.split(',').next()).map(str::trim).filter(|v| !v.is_empty());
        let ip = forwarded.or_else(|| header(parts, "x-real-ip")).unwrap_or("127.0.0.1");
        Ok(ClientIp(ip.to_string()))
    }
}
