//! Order tracking after payment.
//!
//! Sellers move their orders through processing and shipping; either party
//! may confirm delivery, which pays the seller out. Orders can be cancelled
//! until they ship.

use std::collections::HashMap;

use uuid::Uuid;

use super::checkout::release_stock;
use super::wallet::load_or_open;
use super::{with_retry, Context, SettlementService};
use crate::domain::aggregates::{FulfillmentStatus, Order, TransactionKind, WalletTransaction};
use crate::store::Changeset;
use crate::{MarketplaceError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Party { Buyer, Seller }

#[derive(Clone)]
pub struct FulfillmentService { ctx: Context }

impl FulfillmentService {
    pub(crate) fn new(ctx: Context) -> Self { Self { ctx } }

    /// An order visible to `actor` as its buyer or seller.
    pub async fn order(&self, actor: Uuid, order_id: Uuid) -> Result<Order> {
        let (order, _) = self.load(actor, order_id).await?;
        Ok(order)
    }

    pub async fn buyer_orders(&self, buyer_id: Uuid) -> Result<Vec<Order>> {
        Ok(self.ctx.store.orders_for_buyer(buyer_id).await?)
    }

    pub async fn seller_orders(&self, seller_id: Uuid) -> Result<Vec<Order>> {
        Ok(self.ctx.store.orders_for_seller(seller_id).await?)
    }

    /// Moves the order to `target`. Delivery settles the seller's share in
    /// the same commit.
    pub async fn advance(&self, actor: Uuid, order_id: Uuid, target: FulfillmentStatus, tracking_number: Option<String>) -> Result<Order> {
        with_retry("advance_order", || self.try_advance(actor, order_id, target, tracking_number.clone())).await
    }

    async fn try_advance(&self, actor: Uuid, order_id: Uuid, target: FulfillmentStatus, tracking_number: Option<String>) -> Result<Order> {
        let (mut order, party) = self.load(actor, order_id).await?;
        let allowed = match target {
            FulfillmentStatus::Processing | FulfillmentStatus::Shipped => party == Party::Seller,
            FulfillmentStatus::Delivered => true,
            FulfillmentStatus::Pending | FulfillmentStatus::Cancelled => {
                return Err(MarketplaceError::Validation(format!("{target:?} is not a fulfillment step")));
            }
        };
        if !allowed {
            return Err(MarketplaceError::Forbidden("only the seller can update this order"));
        }

        let from = order.fulfillment_status();
        order.advance(target, tracking_number)?;
        let mut changes = Changeset::new();
        if target == FulfillmentStatus::Delivered {
            let mut wallet = load_or_open(&self.ctx, order.seller_id()).await?;
            let entry = SettlementService::new(self.ctx.settings.commission_rate).settle(&mut order, &mut wallet)?;
            changes.wallets.push(wallet);
            changes.transactions.push(entry);
        }

        changes.orders.push(order.clone());
        self.ctx.commit(changes).await?;
        tracing::info!(%order_id, %actor, ?from, to = ?target, "order advanced");
        Ok(order)
    }

    /// Cancels before shipment, returning stock and, for a paid order, the
    /// buyer's money. The session is closed once all its orders are cancelled.
    pub async fn cancel(&self, actor: Uuid, order_id: Uuid) -> Result<Order> {
        with_retry("cancel_order", || self.try_cancel(actor, order_id)).await
    }

    async fn try_cancel(&self, actor: Uuid, order_id: Uuid) -> Result<Order> {
        let (mut order, party) = self.load(actor, order_id).await?;
        let refund = order.cancel()?;

        let released: HashMap<Uuid, u32> = order.items().iter().fold(HashMap::new(), |mut acc, line| {
            *acc.entry(line.material_id).or_default() += line.quantity;
            acc
        });
        let mut changes = Changeset { materials: release_stock(&self.ctx, &released).await?, ..Changeset::new() };

        if refund {
            let mut wallet = load_or_open(&self.ctx, order.buyer_id()).await?;
            let change = wallet.credit(order.total())?;
            changes.transactions.push(WalletTransaction::completed(
                wallet.id(), TransactionKind::Refund, order.total().clone(), change, Some(order.id()),
                format!("Refund for cancelled order {}", order.code()),
            ));
            changes.wallets.push(wallet);
        }

        if let Some(mut group) = self.ctx.store.order_group(order.group_id()).await? {
            let siblings = self.ctx.store.orders(group.order_ids()).await?;
            let all_cancelled = siblings
                .iter()
                .filter(|o| o.id() != order.id())
                .all(|o| o.fulfillment_status() == FulfillmentStatus::Cancelled);
            if all_cancelled {
                group.cancel();
                changes.groups.push(group);
            }
        }

        changes.orders.push(order.clone());
        self.ctx.commit(changes).await?;
        tracing::info!(%order_id, %actor, by = ?party, refunded = refund, "order cancelled");
        Ok(order)
    }

    /// Outsiders get not-found rather than forbidden. A user who bought their
    /// own listing acts as the seller, whose rights include every buyer step.
    async fn load(&self, actor: Uuid, order_id: Uuid) -> Result<(Order, Party)> {
        let order = self.ctx.store.order(order_id).await?.ok_or(MarketplaceError::NotFound("order"))?;
        let party = if actor == order.seller_id() {
            Party::Seller
        } else if actor == order.buyer_id() {
            Party::Buyer
        } else {
            return Err(MarketplaceError::NotFound("order"));
        };
        Ok((order, party))
    }
}
