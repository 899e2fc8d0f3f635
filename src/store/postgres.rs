//! Postgres store.
//!
//! Each aggregate is one JSONB document keyed by id, with a `version` column
//! for optimistic locking. Lookup columns are generated from the document
//! (see `migrations/`), so writes only ever touch `id`, `version` and `data`.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use super::{Changeset, Store, StoreError, StoreResult};
use crate::domain::aggregates::{Cart, Material, Order, OrderGroup, Payment, Wallet, WalletTransaction};
use crate::domain::value_objects::IdempotencyKey;
use crate::domain::Versioned;

#[derive(Clone)]
pub struct PgStore { pool: PgPool }

impl PgStore {
    pub async fn connect(url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new().max_connections(max_connections).connect(url).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    async fn fetch_optional<T>(&self, sql: &str, id: Uuid) -> StoreResult<Option<T>>
    where T: Versioned + DeserializeOwned + Send + Unpin + 'static {
        let row: Option<(i64, Json<T>)> = sqlx::query_as(sql).bind(id).fetch_optional(&self.pool).await?;
        Ok(row.map(into_versioned))
    }

    async fn fetch_all<T>(&self, sql: &str, id: Uuid) -> StoreResult<Vec<T>>
    where T: Versioned + DeserializeOwned + Send + Unpin + 'static {
        let rows: Vec<(i64, Json<T>)> = sqlx::query_as(sql).bind(id).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(into_versioned).collect())
    }

    async fn fetch_many<T>(&self, sql: &str, ids: &[Uuid]) -> StoreResult<Vec<T>>
    where T: Versioned + DeserializeOwned + Send + Unpin + 'static {
        let rows: Vec<(i64, Json<T>)> = sqlx::query_as(sql).bind(ids).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(into_versioned).collect())
    }
}

fn into_versioned<T: Versioned>((version, Json(mut doc)): (i64, Json<T>)) -> T {
    doc.set_version(version);
    doc
}

fn unique_violation(err: sqlx::Error, what: &'static str) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Duplicate(what),
        _ => StoreError::Database(err),
    }
}

/// Inserts new documents and compare-and-swaps existing ones.
async fn write_versioned<T>(tx: &mut Transaction<'_, Postgres>, table: &'static str, entity: &'static str, docs: &[T]) -> StoreResult<()>
where T: Versioned + Serialize + Sync {
    for doc in docs {
        if doc.version() == 0 {
            sqlx::query(&format!("INSERT INTO {table} (id, version, data) VALUES ($1, 1, $2)"))
                .bind(doc.id())
                .bind(Json(doc))
                .execute(&mut **tx)
                .await
                .map_err(|e| unique_violation(e, entity))?;
        } else {
            let result = sqlx::query(&format!("UPDATE {table} SET version = version + 1, data = $3 WHERE id = $1 AND version = $2"))
                .bind(doc.id())
                .bind(doc.version())
                .bind(Json(doc))
                .execute(&mut **tx)
                .await
                .map_err(|e| unique_violation(e, entity))?;
            if result.rows_affected() == 0 {
                return Err(StoreError::Conflict { entity, id: doc.id() });
            }
        }
    }
    Ok(())
}

#[async_trait]
impl Store for PgStore {
    async fn material(&self, id: Uuid) -> StoreResult<Option<Material>> {
        self.fetch_optional("SELECT version, data FROM materials WHERE id = $1", id).await
    }

    async fn materials(&self, ids: &[Uuid]) -> StoreResult<Vec<Material>> {
        self.fetch_many("SELECT version, data FROM materials WHERE id = ANY($1)", ids).await
    }

    async fn active_cart(&self, user_id: Uuid) -> StoreResult<Option<Cart>> {
        self.fetch_optional("SELECT version, data FROM carts WHERE user_id = $1 AND status = 'Active'", user_id).await
    }

    async fn order(&self, id: Uuid) -> StoreResult<Option<Order>> {
        self.fetch_optional("SELECT version, data FROM orders WHERE id = $1", id).await
    }

    async fn orders(&self, ids: &[Uuid]) -> StoreResult<Vec<Order>> {
        self.fetch_many("SELECT version, data FROM orders WHERE id = ANY($1) ORDER BY id", ids).await
    }

    async fn orders_for_buyer(&self, buyer_id: Uuid) -> StoreResult<Vec<Order>> {
        self.fetch_all("SELECT version, data FROM orders WHERE buyer_id = $1 ORDER BY id DESC", buyer_id).await
    }

    async fn orders_for_seller(&self, seller_id: Uuid) -> StoreResult<Vec<Order>> {
        self.fetch_all("SELECT version, data FROM orders WHERE seller_id = $1 ORDER BY id DESC", seller_id).await
    }

    async fn order_group(&self, id: Uuid) -> StoreResult<Option<OrderGroup>> {
        self.fetch_optional("SELECT version, data FROM order_groups WHERE id = $1", id).await
    }

    async fn order_group_by_key(&self, buyer_id: Uuid, key: &IdempotencyKey) -> StoreResult<Option<OrderGroup>> {
        let row: Option<(i64, Json<OrderGroup>)> = sqlx::query_as("SELECT version, data FROM order_groups WHERE buyer_id = $1 AND idempotency_key = $2")
            .bind(buyer_id)
            .bind(key.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(into_versioned))
    }

    async fn pending_order_groups(&self) -> StoreResult<Vec<OrderGroup>> {
        let rows: Vec<(i64, Json<OrderGroup>)> = sqlx::query_as("SELECT version, data FROM order_groups WHERE status = 'PendingPayment'")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(into_versioned).collect())
    }

    async fn wallet_for_owner(&self, owner_id: Uuid) -> StoreResult<Option<Wallet>> {
        self.fetch_optional("SELECT version, data FROM wallets WHERE owner_id = $1", owner_id).await
    }

    async fn wallet_transactions(&self, wallet_id: Uuid) -> StoreResult<Vec<WalletTransaction>> {
        let rows: Vec<(Json<WalletTransaction>,)> = sqlx::query_as("SELECT data FROM wallet_transactions WHERE wallet_id = $1 ORDER BY id DESC")
            .bind(wallet_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(Json(tx),)| tx).collect())
    }

    async fn wallet_transaction(&self, id: Uuid) -> StoreResult<Option<WalletTransaction>> {
        let row: Option<(Json<WalletTransaction>,)> = sqlx::query_as("SELECT data FROM wallet_transactions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(Json(tx),)| tx))
    }

    async fn payment(&self, id: Uuid) -> StoreResult<Option<Payment>> {
        self.fetch_optional("SELECT version, data FROM payments WHERE id = $1", id).await
    }

    async fn commit(&self, changes: Changeset) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        write_versioned(&mut tx, "materials", "material", &changes.materials).await?;
        write_versioned(&mut tx, "carts", "active cart", &changes.carts).await?;
        write_versioned(&mut tx, "order_groups", "checkout session", &changes.groups).await?;
        write_versioned(&mut tx, "orders", "order", &changes.orders).await?;
        write_versioned(&mut tx, "wallets", "wallet", &changes.wallets).await?;
        write_versioned(&mut tx, "payments", "payment", &changes.payments).await?;
        for entry in &changes.transactions {
            sqlx::query("INSERT INTO wallet_transactions (id, data) VALUES ($1, $2) ON CONFLICT (id) DO UPDATE SET data = EXCLUDED.data")
                .bind(entry.id())
                .bind(Json(entry))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
