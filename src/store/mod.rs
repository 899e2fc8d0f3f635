//! Persistence port.
//!
//! Reads are per aggregate; every write goes through [`Store::commit`], which
//! applies a whole [`Changeset`] atomically. Versioned aggregates carry the
//! revision they were loaded at and a commit fails with
//! [`StoreError::Conflict`] when any of them has moved on since.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::{Cart, Material, Order, OrderGroup, Payment, Wallet, WalletTransaction};
use crate::domain::events::DomainEvent;
use crate::domain::value_objects::IdempotencyKey;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} {id} was modified concurrently")]
    Conflict { entity: &'static str, id: Uuid },
    #[error("{0} already exists")]
    Duplicate(&'static str),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Writes that must land together.
#[derive(Debug, Default)]
pub struct Changeset {
    pub materials: Vec<Material>,
    pub carts: Vec<Cart>,
    pub groups: Vec<OrderGroup>,
    pub orders: Vec<Order>,
    pub wallets: Vec<Wallet>,
    pub payments: Vec<Payment>,
    pub transactions: Vec<WalletTransaction>,
}

impl Changeset {
    pub fn new() -> Self { Self::default() }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty() && self.carts.is_empty() && self.groups.is_empty() && self.orders.is_empty()
            && self.wallets.is_empty() && self.payments.is_empty() && self.transactions.is_empty()
    }

    /// Drains events raised by the aggregates in this changeset.
    pub fn take_events(&mut self) -> Vec<DomainEvent> {
        let mut events = Vec::new();
        events.extend(self.groups.iter_mut().flat_map(OrderGroup::take_events));
        events.extend(self.orders.iter_mut().flat_map(Order::take_events));
        events.extend(self.payments.iter_mut().flat_map(Payment::take_events));
        events.extend(self.wallets.iter_mut().flat_map(Wallet::take_events));
        events
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn material(&self, id: Uuid) -> StoreResult<Option<Material>>;
    async fn materials(&self, ids: &[Uuid]) -> StoreResult<Vec<Material>>;

    /// The user's single active cart, if one exists.
    async fn active_cart(&self, user_id: Uuid) -> StoreResult<Option<Cart>>;

    async fn order(&self, id: Uuid) -> StoreResult<Option<Order>>;
    async fn orders(&self, ids: &[Uuid]) -> StoreResult<Vec<Order>>;
    /// Newest first.
    async fn orders_for_buyer(&self, buyer_id: Uuid) -> StoreResult<Vec<Order>>;
    /// Newest first.
    async fn orders_for_seller(&self, seller_id: Uuid) -> StoreResult<Vec<Order>>;

    async fn order_group(&self, id: Uuid) -> StoreResult<Option<OrderGroup>>;
    async fn order_group_by_key(&self, buyer_id: Uuid, key: &IdempotencyKey) -> StoreResult<Option<OrderGroup>>;
    /// Groups still awaiting payment, expired or not.
    async fn pending_order_groups(&self) -> StoreResult<Vec<OrderGroup>>;

    async fn wallet_for_owner(&self, owner_id: Uuid) -> StoreResult<Option<Wallet>>;
    /// Newest first.
    async fn wallet_transactions(&self, wallet_id: Uuid) -> StoreResult<Vec<WalletTransaction>>;
    async fn wallet_transaction(&self, id: Uuid) -> StoreResult<Option<WalletTransaction>>;

    async fn payment(&self, id: Uuid) -> StoreResult<Option<Payment>>;

    async fn commit(&self, changes: Changeset) -> StoreResult<()>;
}
