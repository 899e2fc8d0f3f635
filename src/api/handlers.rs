use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::extract::{ActingUser, ClientIp, IdempotencyHeader};
use super::AppState;
use crate::domain::aggregates::{Address, Cart, FulfillmentStatus, Material, MaterialStatus, Order, OrderGroup, Wallet, WalletTransaction};
use crate::payments::IpnResponse;
use crate::services::{CallbackOutcome, CheckoutSession, MaterialListing, PaymentRedirect};
use crate::Result;

/// Upper bound for any single price or wallet amount, in dong.
const MAX_AMOUNT: i64 = 100_000_000_000;

fn bounded_amount(value: &Decimal) -> std::result::Result<(), ValidationError> {
    if *value > Decimal::ZERO && *value <= Decimal::from(MAX_AMOUNT) {
        Ok(())
    } else {
        Err(ValidationError::new("amount_out_of_range"))
    }
}

// =============================================================================
// Materials
// =============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct UpsertMaterialRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(custom = "bounded_amount")]
    pub unit_price: Decimal,
    #[serde(default = "active")]
    pub status: MaterialStatus,
}

fn active() -> MaterialStatus { MaterialStatus::Active }

#[derive(Debug, Deserialize, Validate)]
pub struct RestockRequest {
    #[validate(range(min = 1))]
    pub quantity: u32,
}

pub async fn upsert_material(State(s): State<AppState>, ActingUser(seller): ActingUser, Path(id): Path<Uuid>, Json(r): Json<UpsertMaterialRequest>) -> Result<Json<Material>> {
    r.validate()?;
    let listing = MaterialListing { name: r.name, unit_price: r.unit_price, status: r.status };
    Ok(Json(s.marketplace.catalog.upsert_material(seller, id, listing).await?))
}

pub async fn get_material(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Material>> {
    Ok(Json(s.marketplace.catalog.material(id).await?))
}

pub async fn restock_material(State(s): State<AppState>, ActingUser(seller): ActingUser, Path(id): Path<Uuid>, Json(r): Json<RestockRequest>) -> Result<Json<Material>> {
    r.validate()?;
    Ok(Json(s.marketplace.catalog.restock(seller, id, r.quantity).await?))
}

// =============================================================================
// Cart
// =============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct AddCartItemRequest {
    pub material_id: Uuid,
    #[validate(range(min = 1, max = 999))]
    pub quantity: u32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCartItemRequest {
    #[validate(range(max = 999))]
    pub quantity: u32,
}

pub async fn get_cart(State(s): State<AppState>, ActingUser(user): ActingUser) -> Result<Json<Cart>> {
    Ok(Json(s.marketplace.carts.cart(user).await?))
}

pub async fn add_cart_item(State(s): State<AppState>, ActingUser(user): ActingUser, Json(r): Json<AddCartItemRequest>) -> Result<(StatusCode, Json<Cart>)> {
    r.validate()?;
    Ok((StatusCode::CREATED, Json(s.marketplace.carts.add_item(user, r.material_id, r.quantity).await?)))
}

pub async fn update_cart_item(State(s): State<AppState>, ActingUser(user): ActingUser, Path(material_id): Path<Uuid>, Json(r): Json<UpdateCartItemRequest>) -> Result<Json<Cart>> {
    r.validate()?;
    Ok(Json(s.marketplace.carts.update_quantity(user, material_id, r.quantity).await?))
}

pub async fn remove_cart_item(State(s): State<AppState>, ActingUser(user): ActingUser, Path(material_id): Path<Uuid>) -> Result<Json<Cart>> {
    Ok(Json(s.marketplace.carts.remove_item(user, material_id).await?))
}

pub async fn clear_cart(State(s): State<AppState>, ActingUser(user): ActingUser) -> Result<StatusCode> {
    s.marketplace.carts.clear(user).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Checkout
// =============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct AddressInput {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(min = 8, max = 20))]
    pub phone: String,
    #[validate(length(min = 1, max = 200))]
    pub street1: String,
    pub street2: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub city: String,
    pub province: Option<String>,
    #[validate(length(equal = 2))]
    #[serde(default = "vietnam")]
    pub country: String,
}

fn vietnam() -> String { "VN".to_string() }

impl From<AddressInput> for Address {
    fn from(a: AddressInput) -> Self {
        Address { name: a.name, phone: a.phone, street1: a.street1, street2: a.street2, city: a.city, province: a.province, country: a.country.to_uppercase() }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateSessionRequest {
    #[validate]
    pub shipping_address: AddressInput,
    /// Check out only these cart lines; the whole cart when absent.
    pub material_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub group: OrderGroup,
    pub orders: Vec<Order>,
    pub amount_due: Decimal,
}

impl TryFrom<CheckoutSession> for SessionResponse {
    type Error = crate::MarketplaceError;

    fn try_from(session: CheckoutSession) -> Result<Self> {
        let amount_due = session.amount_due()?.amount();
        Ok(SessionResponse { group: session.group, orders: session.orders, amount_due })
    }
}

pub async fn create_checkout_session(
    State(s): State<AppState>,
    ActingUser(buyer): ActingUser,
    IdempotencyHeader(key): IdempotencyHeader,
    Json(r): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionResponse>)> {
    r.validate()?;
    let session = s.marketplace.checkout.create_session(buyer, key, r.shipping_address.into(), r.material_ids).await?;
    Ok((StatusCode::CREATED, Json(session.try_into()?)))
}

pub async fn get_checkout_session(State(s): State<AppState>, ActingUser(buyer): ActingUser, Path(id): Path<Uuid>) -> Result<Json<SessionResponse>> {
    Ok(Json(s.marketplace.checkout.session(buyer, id).await?.try_into()?))
}

pub async fn pay_with_wallet(State(s): State<AppState>, ActingUser(buyer): ActingUser, Path(id): Path<Uuid>) -> Result<Json<SessionResponse>> {
    Ok(Json(s.marketplace.payments.pay_with_wallet(buyer, id).await?.try_into()?))
}

pub async fn pay_with_vnpay(State(s): State<AppState>, ActingUser(buyer): ActingUser, ClientIp(ip): ClientIp, Path(id): Path<Uuid>) -> Result<Json<PaymentRedirect>> {
    Ok(Json(s.marketplace.payments.start_vnpay_checkout(buyer, id, &ip).await?))
}

// =============================================================================
// Gateway callbacks
// =============================================================================

pub async fn vnpay_return(State(s): State<AppState>, Query(params): Query<HashMap<String, String>>) -> Result<Json<CallbackOutcome>> {
    Ok(Json(s.marketplace.payments.handle_vnpay_return(&params).await?))
}

pub async fn vnpay_ipn(State(s): State<AppState>, Query(params): Query<HashMap<String, String>>) -> Json<IpnResponse> {
    let response = s.marketplace.payments.handle_vnpay_ipn(&params).await;
    tracing::info!(rsp_code = response.code(), "vnpay ipn handled");
    Json(response)
}

// =============================================================================
// Orders
// =============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct FulfillmentRequest {
    pub status: FulfillmentStatus,
    #[validate(length(max = 64))]
    pub tracking_number: Option<String>,
}

pub async fn list_orders(State(s): State<AppState>, ActingUser(buyer): ActingUser) -> Result<Json<Vec<Order>>> {
    Ok(Json(s.marketplace.fulfillment.buyer_orders(buyer).await?))
}

pub async fn list_seller_orders(State(s): State<AppState>, ActingUser(seller): ActingUser) -> Result<Json<Vec<Order>>> {
    Ok(Json(s.marketplace.fulfillment.seller_orders(seller).await?))
}

pub async fn get_order(State(s): State<AppState>, ActingUser(user): ActingUser, Path(id): Path<Uuid>) -> Result<Json<Order>> {
    Ok(Json(s.marketplace.fulfillment.order(user, id).await?))
}

pub async fn update_fulfillment(State(s): State<AppState>, ActingUser(user): ActingUser, Path(id): Path<Uuid>, Json(r): Json<FulfillmentRequest>) -> Result<Json<Order>> {
    r.validate()?;
    Ok(Json(s.marketplace.fulfillment.advance(user, id, r.status, r.tracking_number).await?))
}

pub async fn cancel_order(State(s): State<AppState>, ActingUser(user): ActingUser, Path(id): Path<Uuid>) -> Result<Json<Order>> {
    Ok(Json(s.marketplace.fulfillment.cancel(user, id).await?))
}

// =============================================================================
// Wallet
// =============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct AmountRequest {
    #[validate(custom = "bounded_amount")]
    pub amount: Decimal,
}

pub async fn get_wallet(State(s): State<AppState>, ActingUser(user): ActingUser) -> Result<Json<Wallet>> {
    Ok(Json(s.marketplace.wallets.wallet(user).await?))
}

pub async fn list_wallet_transactions(State(s): State<AppState>, ActingUser(user): ActingUser) -> Result<Json<Vec<WalletTransaction>>> {
    Ok(Json(s.marketplace.wallets.transactions(user).await?))
}

pub async fn deposit(State(s): State<AppState>, ActingUser(user): ActingUser, ClientIp(ip): ClientIp, Json(r): Json<AmountRequest>) -> Result<Json<PaymentRedirect>> {
    r.validate()?;
    Ok(Json(s.marketplace.payments.start_wallet_deposit(user, r.amount, &ip).await?))
}

pub async fn withdraw(State(s): State<AppState>, ActingUser(user): ActingUser, Json(r): Json<AmountRequest>) -> Result<(StatusCode, Json<WalletTransaction>)> {
    r.validate()?;
    Ok((StatusCode::CREATED, Json(s.marketplace.wallets.withdraw(user, r.amount).await?)))
}
