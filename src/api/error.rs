//! HTTP rendering of [`MarketplaceError`].

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::domain::aggregates::{CartError, MaterialError, OrderError, WalletError};
use crate::payments::VnPayError;
use crate::store::StoreError;
use crate::MarketplaceError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    pub message: String,
}

impl MarketplaceError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        use MarketplaceError::*;
        match self {
            NotFound(_) | Cart(CartError::ItemNotFound) => (StatusCode::NOT_FOUND, "not_found"),
            Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
            Validation(_) | EmptyCart | Money(_) | IdempotencyKey(_) | Cart(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            Material(MaterialError::InsufficientStock { .. }) => (StatusCode::CONFLICT, "insufficient_stock"),
            Material(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            Wallet(WalletError::InsufficientBalance { .. }) => (StatusCode::PAYMENT_REQUIRED, "insufficient_balance"),
            Wallet(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            Order(OrderError::Amount(_)) => (StatusCode::BAD_REQUEST, "validation_error"),
            Order(_) | Group(_) | Payment(_) => (StatusCode::CONFLICT, "invalid_state"),
            AmountMismatch { .. } => (StatusCode::BAD_REQUEST, "amount_mismatch"),
            Gateway(VnPayError::InvalidSignature) => (StatusCode::BAD_REQUEST, "invalid_signature"),
            Gateway(_) => (StatusCode::BAD_REQUEST, "gateway_error"),
            GatewayUnavailable => (StatusCode::SERVICE_UNAVAILABLE, "gateway_unavailable"),
            Store(StoreError::Conflict { .. } | StoreError::Duplicate(_)) => (StatusCode::CONFLICT, "conflict"),
            Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl IntoResponse for MarketplaceError {
    fn into_response(self) -> Response {
        let (status, error) = self.status_and_code();
        let message = if status.is_server_error() && !matches!(self, MarketplaceError::GatewayUnavailable) {
            tracing::error!(error = %self, "request failed");
            "internal server error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(ErrorResponse { error, message })).into_response()
    }
}

impl From<validator::ValidationErrors> for MarketplaceError {
    fn from(err: validator::ValidationErrors) -> Self {
        MarketplaceError::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn maps_domain_errors_to_statuses() {
        let cases = [
            (MarketplaceError::NotFound("order"), StatusCode::NOT_FOUND),
            (MarketplaceError::EmptyCart, StatusCode::BAD_REQUEST),
            (MaterialError::InsufficientStock { available: 1, requested: 2 }.into(), StatusCode::CONFLICT),
            (WalletError::InsufficientBalance { available: Decimal::ZERO, required: Decimal::ONE }.into(), StatusCode::PAYMENT_REQUIRED),
            (MarketplaceError::GatewayUnavailable, StatusCode::SERVICE_UNAVAILABLE),
            (StoreError::Duplicate("wallet").into(), StatusCode::CONFLICT),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }
}
