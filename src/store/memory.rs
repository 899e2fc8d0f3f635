//! In-process store. Used by tests and when no database is configured.

use std::cmp::Reverse;
use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{Changeset, Store, StoreError, StoreResult};
use crate::domain::aggregates::{Cart, CartStatus, GroupStatus, Material, Order, OrderGroup, Payment, Wallet, WalletTransaction};
use crate::domain::value_objects::IdempotencyKey;
use crate::domain::Versioned;

#[derive(Default)]
struct Tables {
    materials: HashMap<Uuid, Material>,
    carts: HashMap<Uuid, Cart>,
    groups: HashMap<Uuid, OrderGroup>,
    orders: HashMap<Uuid, Order>,
    wallets: HashMap<Uuid, Wallet>,
    payments: HashMap<Uuid, Payment>,
    transactions: HashMap<Uuid, WalletTransaction>,
}

#[derive(Default)]
pub struct MemoryStore { tables: RwLock<Tables> }

impl MemoryStore {
    pub fn new() -> Self { Self::default() }
}

fn check_versions<T: Versioned>(table: &HashMap<Uuid, T>, incoming: &[T], entity: &'static str) -> StoreResult<()> {
    for item in incoming {
        let stored = table.get(&item.id()).map_or(0, |s| s.version());
        if stored != item.version() { return Err(StoreError::Conflict { entity, id: item.id() }); }
    }
    Ok(())
}

fn apply<T: Versioned>(table: &mut HashMap<Uuid, T>, incoming: Vec<T>) {
    for mut item in incoming {
        item.set_version(item.version() + 1);
        table.insert(item.id(), item);
    }
}

impl Tables {
    fn check_unique(&self, changes: &Changeset) -> StoreResult<()> {
        for cart in changes.carts.iter().filter(|c| c.version() == 0 && c.status() == CartStatus::Active) {
            if self.carts.values().any(|c| c.user_id() == cart.user_id() && c.status() == CartStatus::Active && c.id() != cart.id()) {
                return Err(StoreError::Duplicate("active cart"));
            }
        }
        for wallet in changes.wallets.iter().filter(|w| w.version() == 0) {
            if self.wallets.values().any(|w| w.owner_id() == wallet.owner_id()) {
                return Err(StoreError::Duplicate("wallet"));
            }
        }
        for group in changes.groups.iter().filter(|g| g.version() == 0) {
            if self.groups.values().any(|g| g.buyer_id() == group.buyer_id() && g.idempotency_key() == group.idempotency_key()) {
                return Err(StoreError::Duplicate("checkout session"));
            }
        }
        Ok(())
    }
}

fn newest_first<T, F: Fn(&T) -> chrono::DateTime<chrono::Utc>>(mut items: Vec<T>, created_at: F) -> Vec<T> {
    items.sort_by_key(|i| Reverse(created_at(i)));
    items
}

#[async_trait]
impl Store for MemoryStore {
    async fn material(&self, id: Uuid) -> StoreResult<Option<Material>> {
        Ok(self.tables.read().await.materials.get(&id).cloned())
    }

    async fn materials(&self, ids: &[Uuid]) -> StoreResult<Vec<Material>> {
        let t = self.tables.read().await;
        Ok(ids.iter().filter_map(|id| t.materials.get(id).cloned()).collect())
    }

    async fn active_cart(&self, user_id: Uuid) -> StoreResult<Option<Cart>> {
        let t = self.tables.read().await;
        Ok(t.carts.values().find(|c| c.user_id() == user_id && c.status() == CartStatus::Active).cloned())
    }

    async fn order(&self, id: Uuid) -> StoreResult<Option<Order>> {
        Ok(self.tables.read().await.orders.get(&id).cloned())
    }

    async fn orders(&self, ids: &[Uuid]) -> StoreResult<Vec<Order>> {
        let t = self.tables.read().await;
        Ok(ids.iter().filter_map(|id| t.orders.get(id).cloned()).collect())
    }

    async fn orders_for_buyer(&self, buyer_id: Uuid) -> StoreResult<Vec<Order>> {
        let t = self.tables.read().await;
        let orders = t.orders.values().filter(|o| o.buyer_id() == buyer_id).cloned().collect();
        Ok(newest_first(orders, Order::created_at))
    }

    async fn orders_for_seller(&self, seller_id: Uuid) -> StoreResult<Vec<Order>> {
        let t = self.tables.read().await;
        let orders = t.orders.values().filter(|o| o.seller_id() == seller_id).cloned().collect();
        Ok(newest_first(orders, Order::created_at))
    }

    async fn order_group(&self, id: Uuid) -> StoreResult<Option<OrderGroup>> {
        Ok(self.tables.read().await.groups.get(&id).cloned())
    }

    async fn order_group_by_key(&self, buyer_id: Uuid, key: &IdempotencyKey) -> StoreResult<Option<OrderGroup>> {
        let t = self.tables.read().await;
        Ok(t.groups.values().find(|g| g.buyer_id() == buyer_id && g.idempotency_key() == key).cloned())
    }

    async fn pending_order_groups(&self) -> StoreResult<Vec<OrderGroup>> {
        let t = self.tables.read().await;
        Ok(t.groups.values().filter(|g| g.status() == GroupStatus::PendingPayment).cloned().collect())
    }

    async fn wallet_for_owner(&self, owner_id: Uuid) -> StoreResult<Option<Wallet>> {
        let t = self.tables.read().await;
        Ok(t.wallets.values().find(|w| w.owner_id() == owner_id).cloned())
    }

    async fn wallet_transactions(&self, wallet_id: Uuid) -> StoreResult<Vec<WalletTransaction>> {
        let t = self.tables.read().await;
        let txs = t.transactions.values().filter(|tx| tx.wallet_id() == wallet_id).cloned().collect();
        Ok(newest_first(txs, WalletTransaction::created_at))
    }

    async fn wallet_transaction(&self, id: Uuid) -> StoreResult<Option<WalletTransaction>> {
        Ok(self.tables.read().await.transactions.get(&id).cloned())
    }

    async fn payment(&self, id: Uuid) -> StoreResult<Option<Payment>> {
        Ok(self.tables.read().await.payments.get(&id).cloned())
    }

    async fn commit(&self, changes: Changeset) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        check_versions(&t.materials, &changes.materials, "material")?;
        check_versions(&t.carts, &changes.carts, "cart")?;
        check_versions(&t.groups, &changes.groups, "order group")?;
        check_versions(&t.orders, &changes.orders, "order")?;
        check_versions(&t.wallets, &changes.wallets, "wallet")?;
        check_versions(&t.payments, &changes.payments, "payment")?;
        t.check_unique(&changes)?;

        let Changeset { materials, carts, groups, orders, wallets, payments, transactions } = changes;
        apply(&mut t.materials, materials);
        apply(&mut t.carts, carts);
        apply(&mut t.groups, groups);
        apply(&mut t.orders, orders);
        apply(&mut t.wallets, wallets);
        apply(&mut t.payments, payments);
        for tx in transactions {
            t.transactions.insert(tx.id(), tx);
        }
        Ok(())
    }
}
