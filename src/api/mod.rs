//! REST surface of the marketplace.

use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::{Json, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::services::Marketplace;

pub mod error;
pub mod extract;
mod handlers;

use handlers::*;

#[derive(Clone)]
pub struct AppState { pub marketplace: Arc<Marketplace> }

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "ecofashion-commerce"})) }))
        .route("/api/v1/materials/:id", get(get_material).put(upsert_material))
        .route("/api/v1/materials/:id/restock", post(restock_material))
        .route("/api/v1/cart", get(get_cart).delete(clear_cart))
        .route("/api/v1/cart/items", post(add_cart_item))
        .route("/api/v1/cart/items/:material_id", put(update_cart_item).delete(remove_cart_item))
        .route("/api/v1/checkout/sessions", post(create_checkout_session))
        .route("/api/v1/checkout/sessions/:id", get(get_checkout_session))
        .route("/api/v1/checkout/sessions/:id/pay/wallet", post(pay_with_wallet))
        .route("/api/v1/checkout/sessions/:id/pay/vnpay", post(pay_with_vnpay))
        .route("/api/v1/payments/vnpay/return", get(vnpay_return))
        .route("/api/v1/payments/vnpay/ipn", get(vnpay_ipn))
        .route("/api/v1/orders", get(list_orders))
        .route("/api/v1/orders/:id", get(get_order))
        .route("/api/v1/orders/:id/fulfillment", put(update_fulfillment))
        .route("/api/v1/orders/:id/cancel", post(cancel_order))
        .route("/api/v1/seller/orders", get(list_seller_orders))
        .route("/api/v1/wallet", get(get_wallet))
        .route("/api/v1/wallet/transactions", get(list_wallet_transactions))
        .route("/api/v1/wallet/deposit", post(deposit))
        .route("/api/v1/wallet/withdraw", post(withdraw))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
