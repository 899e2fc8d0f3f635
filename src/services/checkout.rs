//! Checkout sessions.
//!
//! A session turns (part of) a cart into one order per seller, grouped under
//! an [`OrderGroup`]. Stock is reserved when the session opens and returned
//! when it expires unpaid.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::{with_retry, Context};
use crate::domain::aggregates::{Address, FulfillmentStatus, LineItem, Material, Order, OrderGroup, PaymentStatus};
use crate::domain::value_objects::{IdempotencyKey, Money};
use crate::store::Changeset;
use crate::{MarketplaceError, Result};

/// A checkout session with the orders it produced.
#[derive(Clone, Debug, Serialize)]
pub struct CheckoutSession {
    pub group: OrderGroup,
    pub orders: Vec<Order>,
}

impl CheckoutSession {
    /// Orders still waiting for payment. Orders cancelled after the session
    /// opened are excluded.
    pub fn payable_orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.iter().filter(|o| o.payment_status() == PaymentStatus::Pending && o.fulfillment_status() == FulfillmentStatus::Pending)
    }

    pub fn amount_due(&self) -> Result<Money> {
        let zero = Money::zero(self.group.total().currency());
        Ok(self.payable_orders().try_fold(zero, |acc, o| acc.add(o.total()))?)
    }
}

#[derive(Clone)]
pub struct CheckoutService { ctx: Context }

impl CheckoutService {
    pub(crate) fn new(ctx: Context) -> Self { Self { ctx } }

    /// Opens a session for the buyer's cart, or for only `material_ids` of it.
    ///
    /// Replaying the same idempotency key returns the session created the
    /// first time and creates nothing new.
    pub async fn create_session(&self, buyer_id: Uuid, key: IdempotencyKey, address: Address, material_ids: Option<Vec<Uuid>>) -> Result<CheckoutSession> {
        with_retry("create_checkout_session", || self.try_create(buyer_id, &key, &address, material_ids.as_deref())).await
    }

    async fn try_create(&self, buyer_id: Uuid, key: &IdempotencyKey, address: &Address, selection: Option<&[Uuid]>) -> Result<CheckoutSession> {
        if let Some(group) = self.ctx.store.order_group_by_key(buyer_id, key).await? {
            tracing::info!(group_id = %group.id(), %buyer_id, "checkout session replayed");
            return self.load(group).await;
        }

        let mut cart = self.ctx.store.active_cart(buyer_id).await?.ok_or(MarketplaceError::EmptyCart)?;
        let selected: Vec<Uuid> = match selection {
            Some(ids) => {
                if let Some(missing) = ids.iter().find(|id| cart.item(**id).is_none()) {
                    return Err(MarketplaceError::Validation(format!("material {missing} is not in the cart")));
                }
                ids.to_vec()
            }
            None => cart.items().iter().map(|i| i.material_id).collect(),
        };
        if selected.is_empty() { return Err(MarketplaceError::EmptyCart); }

        let mut materials: HashMap<Uuid, Material> =
            self.ctx.store.materials(&selected).await?.into_iter().map(|m| (m.id(), m)).collect();

        let currency = &self.ctx.settings.currency;
        let shipping_fee = Money::new(self.ctx.settings.shipping_fee_per_seller, currency);
        let group_id = Uuid::now_v7();

        // seller comes from the listing, not from what the cart remembered
        let mut lines_by_seller: BTreeMap<Uuid, Vec<LineItem>> = BTreeMap::new();
        for item in cart.items().iter().filter(|i| selected.contains(&i.material_id)) {
            let material = materials.get_mut(&item.material_id).ok_or(MarketplaceError::NotFound("material"))?;
            if !material.is_purchasable() {
                return Err(MarketplaceError::Validation(format!("material {} is no longer available", item.material_id)));
            }
            material.reserve(item.quantity)?;
            let unit_price = material.unit_price().clone();
            lines_by_seller.entry(material.seller_id()).or_default().push(LineItem {
                material_id: item.material_id,
                name: material.name().to_string(),
                quantity: item.quantity,
                total: unit_price.multiply(item.quantity)?,
                unit_price,
            });
        }

        let mut orders = Vec::with_capacity(lines_by_seller.len());
        for (seller_id, lines) in lines_by_seller {
            orders.push(Order::create(group_id, buyer_id, seller_id, lines, shipping_fee.clone(), address.clone())?);
        }
        let total = orders.iter().try_fold(Money::zero(currency), |acc, o| acc.add(o.total()))?;
        let group = OrderGroup::open(group_id, buyer_id, key.clone(), orders.iter().map(Order::id).collect(), total, self.ctx.settings.payment_window);

        cart.remove_materials(&selected);
        let session = CheckoutSession { group: group.clone(), orders: orders.clone() };
        self.ctx
            .commit(Changeset {
                materials: materials.into_values().collect(),
                carts: vec![cart],
                groups: vec![group],
                orders,
                ..Changeset::new()
            })
            .await?;

        tracing::info!(
            group_id = %group_id, %buyer_id, orders = session.orders.len(), total = %session.group.total(),
            expires_at = %session.group.expires_at(), "checkout session created"
        );
        Ok(session)
    }

    /// The buyer's session. Someone else's session reads as not found.
    pub async fn session(&self, buyer_id: Uuid, group_id: Uuid) -> Result<CheckoutSession> {
        let group = self.ctx.store.order_group(group_id).await?
            .filter(|g| g.buyer_id() == buyer_id)
            .ok_or(MarketplaceError::NotFound("checkout session"))?;
        self.load(group).await
    }

    pub(crate) async fn load(&self, group: OrderGroup) -> Result<CheckoutSession> {
        let orders = self.ctx.store.orders(group.order_ids()).await?;
        Ok(CheckoutSession { group, orders })
    }

    /// Expires unpaid sessions whose payment window has closed and returns
    /// their reserved stock. Returns how many sessions were expired.
    pub async fn expire_stale_sessions(&self, now: DateTime<Utc>) -> Result<usize> {
        let stale: Vec<Uuid> = self.ctx.store.pending_order_groups().await?
            .into_iter()
            .filter(|g| g.is_expired(now))
            .map(|g| g.id())
            .collect();

        let mut expired = 0;
        for group_id in stale {
            match with_retry("expire_checkout_session", || self.try_expire(group_id, now)).await {
                Ok(true) => expired += 1,
                Ok(false) => {}
                Err(e) => tracing::warn!(%group_id, error = %e, "failed to expire checkout session"),
            }
        }
        if expired > 0 {
            tracing::info!(expired, "expired stale checkout sessions");
        }
        Ok(expired)
    }

    async fn try_expire(&self, group_id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let Some(mut group) = self.ctx.store.order_group(group_id).await? else { return Ok(false) };
        // paid or cancelled since the scan
        if !group.is_expired(now) { return Ok(false); }

        let mut orders = self.ctx.store.orders(group.order_ids()).await?;
        let mut released: HashMap<Uuid, u32> = HashMap::new();
        for order in orders.iter_mut().filter(|o| o.payment_status() == PaymentStatus::Pending && o.fulfillment_status() == FulfillmentStatus::Pending) {
            order.expire()?;
            for line in order.items() {
                *released.entry(line.material_id).or_default() += line.quantity;
            }
        }
        let materials = release_stock(&self.ctx, &released).await?;
        group.expire()?;

        self.ctx.commit(Changeset { materials, groups: vec![group], orders, ..Changeset::new() }).await?;
        tracing::info!(%group_id, "checkout session expired");
        Ok(true)
    }
}

/// Loads the listings in `quantities` and puts the units back on sale.
/// Listings that no longer exist are skipped.
pub(crate) async fn release_stock(ctx: &Context, quantities: &HashMap<Uuid, u32>) -> Result<Vec<Material>> {
    if quantities.is_empty() { return Ok(vec![]); }
    let ids: Vec<Uuid> = quantities.keys().copied().collect();
    let mut materials = ctx.store.materials(&ids).await?;
    for material in &mut materials {
        if let Some(qty) = quantities.get(&material.id()) {
            material.release(*qty);
        }
    }
    Ok(materials)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{CartStatus, GroupStatus};
    use crate::domain::value_objects::MoneyError;
    use crate::services::testing::{listed, marketplace};
    use crate::store::Store;
    use rust_decimal::Decimal;

    fn key(k: &str) -> IdempotencyKey { IdempotencyKey::new(k).unwrap() }

    fn address() -> Address {
        Address { name: "Lan Nguyen".into(), phone: "0900000000".into(), street1: "1 Le Loi".into(), city: "Ho Chi Minh".into(), country: "VN".into(), ..Address::default() }
    }

    #[tokio::test]
    async fn splits_cart_per_seller() {
        let (m, store) = marketplace();
        let buyer = Uuid::new_v4();
        let (s1, s2) = (Uuid::new_v4(), Uuid::new_v4());
        let a = listed(&store, s1, 100_000, 10).await;
        let b = listed(&store, s1, 50_000, 10).await;
        let c = listed(&store, s2, 20_000, 10).await;
        m.carts.add_item(buyer, a.id(), 1).await.unwrap();
        m.carts.add_item(buyer, b.id(), 2).await.unwrap();
        m.carts.add_item(buyer, c.id(), 3).await.unwrap();

        let session = m.checkout.create_session(buyer, key("k1"), address(), None).await.unwrap();
        assert_eq!(session.orders.len(), 2);
        let seller1 = session.orders.iter().find(|o| o.seller_id() == s1).unwrap();
        assert_eq!(seller1.items().len(), 2);
        assert_eq!(seller1.subtotal().amount(), Decimal::new(200_000, 0));
        assert_eq!(seller1.total().amount(), Decimal::new(230_000, 0));
        // 230k + (60k + 30k)
        assert_eq!(session.group.total().amount(), Decimal::new(320_000, 0));
        assert_eq!(session.amount_due().unwrap().amount(), Decimal::new(320_000, 0));

        assert_eq!(store.material(a.id()).await.unwrap().unwrap().stock().value(), 9);
        assert_eq!(store.material(c.id()).await.unwrap().unwrap().stock().value(), 7);
        assert!(store.active_cart(buyer).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn same_key_returns_same_session() {
        let (m, store) = marketplace();
        let buyer = Uuid::new_v4();
        let a = listed(&store, Uuid::new_v4(), 100_000, 10).await;
        m.carts.add_item(buyer, a.id(), 1).await.unwrap();

        let first = m.checkout.create_session(buyer, key("retry-me"), address(), None).await.unwrap();
        let second = m.checkout.create_session(buyer, key("retry-me"), address(), None).await.unwrap();
        assert_eq!(first.group.id(), second.group.id());
        assert_eq!(store.orders_for_buyer(buyer).await.unwrap().len(), 1);
        assert_eq!(store.material(a.id()).await.unwrap().unwrap().stock().value(), 9);
    }

    #[tokio::test]
    async fn concurrent_duplicates_share_one_session() {
        let (m, store) = marketplace();
        let buyer = Uuid::new_v4();
        let a = listed(&store, Uuid::new_v4(), 100_000, 10).await;
        m.carts.add_item(buyer, a.id(), 2).await.unwrap();

        let (first, second) = tokio::join!(
            m.checkout.create_session(buyer, key("double-click"), address(), None),
            m.checkout.create_session(buyer, key("double-click"), address(), None),
        );
        assert_eq!(first.unwrap().group.id(), second.unwrap().group.id());
        assert_eq!(store.orders_for_buyer(buyer).await.unwrap().len(), 1);
        assert_eq!(store.material(a.id()).await.unwrap().unwrap().stock().value(), 8);
    }

    #[tokio::test]
    async fn line_total_overflow_is_an_error() {
        let (m, store) = marketplace();
        let buyer = Uuid::new_v4();
        let mut material = Material::create(Uuid::now_v7(), Uuid::new_v4(), "Silk remnant", Money::vnd(Decimal::MAX));
        material.publish().unwrap();
        material.restock(5);
        store.commit(Changeset { materials: vec![material.clone()], ..Changeset::new() }).await.unwrap();
        m.carts.add_item(buyer, material.id(), 2).await.unwrap();

        let err = m.checkout.create_session(buyer, key("huge"), address(), None).await.unwrap_err();
        assert!(matches!(err, MarketplaceError::Money(MoneyError::Overflow)));
        assert_eq!(store.material(material.id()).await.unwrap().unwrap().stock().value(), 5);
        assert!(store.active_cart(buyer).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn partial_checkout_keeps_rest_of_cart() {
        let (m, store) = marketplace();
        let buyer = Uuid::new_v4();
        let a = listed(&store, Uuid::new_v4(), 10_000, 10).await;
        let b = listed(&store, Uuid::new_v4(), 10_000, 10).await;
        m.carts.add_item(buyer, a.id(), 1).await.unwrap();
        m.carts.add_item(buyer, b.id(), 1).await.unwrap();

        let session = m.checkout.create_session(buyer, key("k"), address(), Some(vec![a.id()])).await.unwrap();
        assert_eq!(session.orders.len(), 1);
        let cart = store.active_cart(buyer).await.unwrap().unwrap();
        assert_eq!(cart.status(), CartStatus::Active);
        assert_eq!(cart.item_count(), 1);
        assert!(cart.item(b.id()).is_some());

        let err = m.checkout.create_session(buyer, key("k2"), address(), Some(vec![a.id()])).await.unwrap_err();
        assert!(matches!(err, MarketplaceError::Validation(_)));
    }

    #[tokio::test]
    async fn empty_cart_rejected() {
        let (m, _) = marketplace();
        let err = m.checkout.create_session(Uuid::new_v4(), key("k"), address(), None).await.unwrap_err();
        assert!(matches!(err, MarketplaceError::EmptyCart));
    }

    #[tokio::test]
    async fn stock_shortfall_creates_nothing() {
        let (m, store) = marketplace();
        let buyer = Uuid::new_v4();
        let a = listed(&store, Uuid::new_v4(), 10_000, 5).await;
        m.carts.add_item(buyer, a.id(), 5).await.unwrap();
        // another buyer takes most of the stock first
        let other = Uuid::new_v4();
        m.carts.add_item(other, a.id(), 3).await.unwrap();
        m.checkout.create_session(other, key("o"), address(), None).await.unwrap();

        let err = m.checkout.create_session(buyer, key("b"), address(), None).await.unwrap_err();
        assert!(matches!(err, MarketplaceError::Material(_)));
        assert!(store.orders_for_buyer(buyer).await.unwrap().is_empty());
        assert_eq!(store.active_cart(buyer).await.unwrap().unwrap().item_count(), 1);
    }

    #[tokio::test]
    async fn session_is_private_to_buyer() {
        let (m, store) = marketplace();
        let buyer = Uuid::new_v4();
        let a = listed(&store, Uuid::new_v4(), 10_000, 5).await;
        m.carts.add_item(buyer, a.id(), 1).await.unwrap();
        let session = m.checkout.create_session(buyer, key("k"), address(), None).await.unwrap();
        assert!(m.checkout.session(buyer, session.group.id()).await.is_ok());
        let err = m.checkout.session(Uuid::new_v4(), session.group.id()).await.unwrap_err();
        assert!(matches!(err, MarketplaceError::NotFound(_)));
    }

    #[tokio::test]
    async fn expiry_releases_stock() {
        let (m, store) = marketplace();
        let buyer = Uuid::new_v4();
        let a = listed(&store, Uuid::new_v4(), 10_000, 5).await;
        m.carts.add_item(buyer, a.id(), 2).await.unwrap();
        let session = m.checkout.create_session(buyer, key("k"), address(), None).await.unwrap();

        assert_eq!(m.checkout.expire_stale_sessions(Utc::now()).await.unwrap(), 0);
        let later = session.group.expires_at() + chrono::Duration::seconds(1);
        assert_eq!(m.checkout.expire_stale_sessions(later).await.unwrap(), 1);
        assert_eq!(m.checkout.expire_stale_sessions(later).await.unwrap(), 0);

        let reloaded = m.checkout.session(buyer, session.group.id()).await.unwrap();
        assert_eq!(reloaded.group.status(), GroupStatus::Expired);
        assert!(reloaded.orders.iter().all(|o| o.payment_status() == PaymentStatus::Expired));
        assert_eq!(store.material(a.id()).await.unwrap().unwrap().stock().value(), 5);
    }
}
