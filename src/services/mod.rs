//! Application services: load aggregates, apply one use case, commit.

use std::future::Future;
use std::sync::Arc;

use crate::config::CommerceSettings;
use crate::payments::VnPayClient;
use crate::publisher::EventPublisher;
use crate::store::{Changeset, Store, StoreError};
use crate::{MarketplaceError, Result};

pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod fulfillment;
pub mod payment;
pub mod settlement;
pub mod wallet;

pub use cart::CartService;
pub use catalog::{CatalogService, MaterialListing};
pub use checkout::{CheckoutService, CheckoutSession};
pub use fulfillment::FulfillmentService;
pub use payment::{CallbackOutcome, PaymentRedirect, PaymentService};
pub use settlement::SettlementService;
pub use wallet::WalletService;

const MAX_ATTEMPTS: usize = 3;

/// Every use case of the marketplace, wired to one store.
#[derive(Clone)]
pub struct Marketplace {
    pub catalog: CatalogService,
    pub carts: CartService,
    pub checkout: CheckoutService,
    pub payments: PaymentService,
    pub fulfillment: FulfillmentService,
    pub wallets: WalletService,
}

impl Marketplace {
    pub fn new(store: Arc<dyn Store>, settings: CommerceSettings, vnpay: Option<VnPayClient>, publisher: EventPublisher) -> Self {
        let ctx = Context { store, publisher, settings: Arc::new(settings) };
        Self {
            catalog: CatalogService::new(ctx.clone()),
            carts: CartService::new(ctx.clone()),
            checkout: CheckoutService::new(ctx.clone()),
            payments: PaymentService::new(ctx.clone(), vnpay),
            fulfillment: FulfillmentService::new(ctx.clone()),
            wallets: WalletService::new(ctx),
        }
    }
}

/// Dependencies every service shares.
#[derive(Clone)]
pub(crate) struct Context {
    pub store: Arc<dyn Store>,
    pub publisher: EventPublisher,
    pub settings: Arc<CommerceSettings>,
}

impl Context {
    /// Commits, then publishes the events the committed aggregates raised.
    pub async fn commit(&self, mut changes: Changeset) -> Result<()> {
        let events = changes.take_events();
        self.store.commit(changes).await?;
        self.publisher.publish(events).await;
        Ok(())
    }
}

/// Re-runs `op` when the commit lost an optimistic-concurrency race or hit a
/// unique key another request just claimed. Each attempt reloads its state.
pub(crate) async fn with_retry<T, F, Fut>(operation: &'static str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Err(MarketplaceError::Store(e @ (StoreError::Conflict { .. } | StoreError::Duplicate(_)))) if attempt < MAX_ATTEMPTS => {
                tracing::debug!(operation, attempt, error = %e, "retrying after concurrent write");
                attempt += 1;
            }
            other => return other,
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::domain::aggregates::Material;
    use crate::domain::value_objects::Money;
    use crate::store::MemoryStore;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    pub fn settings() -> CommerceSettings {
        CommerceSettings { shipping_fee_per_seller: Decimal::new(30_000, 0), ..CommerceSettings::default() }
    }

    pub fn marketplace() -> (Marketplace, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (Marketplace::new(store.clone(), settings(), None, EventPublisher::default()), store)
    }

    pub fn vnd(n: i64) -> Money { Money::vnd(Decimal::new(n, 0)) }

    /// An active listing with `stock` units.
    pub async fn listed(store: &MemoryStore, seller_id: Uuid, price: i64, stock: u32) -> Material {
        let mut m = Material::create(Uuid::now_v7(), seller_id, "Organic cotton", vnd(price));
        m.publish().unwrap();
        m.restock(stock);
        store.commit(Changeset { materials: vec![m.clone()], ..Changeset::new() }).await.unwrap();
        store.material(m.id()).await.unwrap().unwrap()
    }

    /// Credits `owner`'s wallet directly.
    pub async fn fund(store: &MemoryStore, owner: Uuid, amount: i64) {
        let mut wallet = match store.wallet_for_owner(owner).await.unwrap() {
            Some(w) => w,
            None => crate::domain::aggregates::Wallet::open(owner, "VND"),
        };
        wallet.credit(&vnd(amount)).unwrap();
        store.commit(Changeset { wallets: vec![wallet], ..Changeset::new() }).await.unwrap();
    }

    #[tokio::test]
    async fn retry_gives_up_after_max_attempts() {
        let mut calls = 0;
        let result: Result<()> = with_retry("test", || {
            calls += 1;
            async { Err(MarketplaceError::Store(StoreError::Conflict { entity: "order", id: Uuid::nil() })) }
        })
        .await;
        assert!(matches!(result, Err(MarketplaceError::Store(StoreError::Conflict { .. }))));
        assert_eq!(calls, MAX_ATTEMPTS);
    }

    #[tokio::test]
    async fn retry_does_not_repeat_domain_errors() {
        let mut calls = 0;
        let result: Result<()> = with_retry("test", || {
            calls += 1;
            async { Err(MarketplaceError::EmptyCart) }
        })
        .await;
        assert!(matches!(result, Err(MarketplaceError::EmptyCart)));
        assert_eq!(calls, 1);
    }
}
