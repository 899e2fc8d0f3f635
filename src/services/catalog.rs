//! Material listings as the cart and checkout see them.

use rust_decimal::Decimal;
use uuid::Uuid;

use super::{with_retry, Context};
use crate::domain::aggregates::{Material, MaterialError, MaterialStatus};
use crate::domain::value_objects::Money;
use crate::store::Changeset;
use crate::{MarketplaceError, Result};

/// Desired state of a listing.
#[derive(Clone, Debug)]
pub struct MaterialListing {
    pub name: String,
    pub unit_price: Decimal,
    pub status: MaterialStatus,
}

#[derive(Clone)]
pub struct CatalogService { ctx: Context }

impl CatalogService {
    pub(crate) fn new(ctx: Context) -> Self { Self { ctx } }

    pub async fn material(&self, id: Uuid) -> Result<Material> {
        self.ctx.store.material(id).await?.ok_or(MarketplaceError::NotFound("material"))
    }

    /// Creates the listing or brings an existing one to `listing`.
    pub async fn upsert_material(&self, seller_id: Uuid, id: Uuid, listing: MaterialListing) -> Result<Material> {
        with_retry("upsert_material", || self.try_upsert(seller_id, id, &listing)).await
    }

    async fn try_upsert(&self, seller_id: Uuid, id: Uuid, listing: &MaterialListing) -> Result<Material> {
        let price = Money::new(listing.unit_price, &self.ctx.settings.currency);
        if !price.is_positive() { return Err(MaterialError::InvalidPrice.into()); }
        let mut material = match self.ctx.store.material(id).await? {
            Some(existing) if existing.seller_id() != seller_id => return Err(MarketplaceError::Forbidden("material belongs to another seller")),
            Some(mut existing) => {
                existing.rename(listing.name.trim());
                existing.update_price(price)?;
                existing
            }
            None => Material::create(id, seller_id, listing.name.trim(), price),
        };
        match listing.status {
            MaterialStatus::Active => material.publish()?,
            MaterialStatus::Archived => material.archive(),
            MaterialStatus::Draft if material.status() != MaterialStatus::Draft => {
                return Err(MarketplaceError::Validation("a published material cannot return to draft".into()));
            }
            MaterialStatus::Draft => {}
        }
        self.ctx.commit(Changeset { materials: vec![material.clone()], ..Changeset::new() }).await?;
        tracing::info!(material_id = %id, %seller_id, status = ?material.status(), "material listing saved");
        Ok(material)
    }

    pub async fn restock(&self, seller_id: Uuid, id: Uuid, quantity: u32) -> Result<Material> {
        if quantity == 0 { return Err(MarketplaceError::Validation("restock quantity must be positive".into())); }
        with_retry("restock", || async move {
            let mut material = self.material(id).await?;
            if material.seller_id() != seller_id { return Err(MarketplaceError::Forbidden("material belongs to another seller")); }
            material.restock(quantity);
            self.ctx.commit(Changeset { materials: vec![material.clone()], ..Changeset::new() }).await?;
            tracing::info!(material_id = %id, quantity, stock = material.stock().value(), "material restocked");
            Ok(material)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{listed, marketplace};

    fn listing(price: i64, status: MaterialStatus) -> MaterialListing {
        MaterialListing { name: "Tencel twill".into(), unit_price: Decimal::new(price, 0), status }
    }

    #[tokio::test]
    async fn creates_and_updates_listing() {
        let (m, _) = marketplace();
        let (seller, id) = (Uuid::new_v4(), Uuid::now_v7());
        let created = m.catalog.upsert_material(seller, id, listing(50_000, MaterialStatus::Active)).await.unwrap();
        assert_eq!(created.status(), MaterialStatus::Active);

        let updated = m.catalog.upsert_material(seller, id, listing(55_000, MaterialStatus::Active)).await.unwrap();
        assert_eq!(updated.unit_price().amount(), Decimal::new(55_000, 0));
        assert_eq!(m.catalog.material(id).await.unwrap().unit_price().amount(), Decimal::new(55_000, 0));
    }

    #[tokio::test]
    async fn other_sellers_cannot_edit() {
        let (m, store) = marketplace();
        let material = listed(&store, Uuid::new_v4(), 10_000, 1).await;
        let err = m.catalog.upsert_material(Uuid::new_v4(), material.id(), listing(1, MaterialStatus::Active)).await.unwrap_err();
        assert!(matches!(err, MarketplaceError::Forbidden(_)));
        let err = m.catalog.restock(Uuid::new_v4(), material.id(), 5).await.unwrap_err();
        assert!(matches!(err, MarketplaceError::Forbidden(_)));
    }

    #[tokio::test]
    async fn rejects_non_positive_price() {
        let (m, _) = marketplace();
        let err = m.catalog.upsert_material(Uuid::new_v4(), Uuid::now_v7(), listing(0, MaterialStatus::Draft)).await.unwrap_err();
        assert!(matches!(err, MarketplaceError::Material(_)));
    }

    #[tokio::test]
    async fn restock_adds_units() {
        let (m, store) = marketplace();
        let seller = Uuid::new_v4();
        let material = listed(&store, seller, 10_000, 2).await;
        let restocked = m.catalog.restock(seller, material.id(), 8).await.unwrap();
        assert_eq!(restocked.stock().value(), 10);
    }
}
