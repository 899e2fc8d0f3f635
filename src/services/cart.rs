//! Cart use cases.

use uuid::Uuid;

use super::{with_retry, Context};
use crate::domain::aggregates::{Cart, CartError, CartItem, Material, MaterialError};
use crate::store::Changeset;
use crate::{MarketplaceError, Result};

#[derive(Clone)]
pub struct CartService { ctx: Context }

impl CartService {
    pub(crate) fn new(ctx: Context) -> Self { Self { ctx } }

    /// The user's active cart; an empty, unsaved one when none exists yet.
    pub async fn cart(&self, user_id: Uuid) -> Result<Cart> {
        Ok(match self.ctx.store.active_cart(user_id).await? {
            Some(cart) => cart,
            None => Cart::for_user(user_id, &self.ctx.settings.currency),
        })
    }

    pub async fn add_item(&self, user_id: Uuid, material_id: Uuid, quantity: u32) -> Result<Cart> {
        with_retry("add_cart_item", || async move {
            let material = self.purchasable(material_id).await?;
            let mut cart = self.cart(user_id).await?;
            let in_cart = cart.item(material_id).map_or(0, |i| i.quantity);
            ensure_stock(&material, in_cart.saturating_add(quantity))?;
            cart.add_item(CartItem {
                material_id,
                seller_id: material.seller_id(),
                name: material.name().to_string(),
                quantity,
                unit_price: material.unit_price().clone(),
            })?;
            self.save(cart, "item added").await
        })
        .await
    }

    /// Sets a line's quantity; zero removes it.
    pub async fn update_quantity(&self, user_id: Uuid, material_id: Uuid, quantity: u32) -> Result<Cart> {
        with_retry("update_cart_item", || async move {
            let mut cart = self.existing(user_id).await?;
            if quantity > 0 {
                let material = self.purchasable(material_id).await?;
                ensure_stock(&material, quantity)?;
            }
            cart.update_quantity(material_id, quantity)?;
            self.save(cart, "quantity updated").await
        })
        .await
    }

    pub async fn remove_item(&self, user_id: Uuid, material_id: Uuid) -> Result<Cart> {
        with_retry("remove_cart_item", || async move {
            let mut cart = self.existing(user_id).await?;
            cart.remove_item(material_id)?;
            self.save(cart, "item removed").await
        })
        .await
    }

    pub async fn clear(&self, user_id: Uuid) -> Result<Cart> {
        with_retry("clear_cart", || async move {
            match self.ctx.store.active_cart(user_id).await? {
                Some(mut cart) => {
                    cart.clear();
                    self.save(cart, "cleared").await
                }
                None => self.cart(user_id).await,
            }
        })
        .await
    }

    async fn existing(&self, user_id: Uuid) -> Result<Cart> {
        self.ctx.store.active_cart(user_id).await?.ok_or(MarketplaceError::Cart(CartError::ItemNotFound))
    }

    async fn purchasable(&self, material_id: Uuid) -> Result<Material> {
        let material = self.ctx.store.material(material_id).await?.ok_or(MarketplaceError::NotFound("material"))?;
        if !material.is_purchasable() {
            return Err(MarketplaceError::Validation(format!("material {material_id} is not available for purchase")));
        }
        Ok(material)
    }

    async fn save(&self, cart: Cart, action: &'static str) -> Result<Cart> {
        self.ctx.commit(Changeset { carts: vec![cart.clone()], ..Changeset::new() }).await?;
        tracing::debug!(cart_id = %cart.id(), user_id = %cart.user_id(), items = cart.item_count(), action, "cart saved");
        Ok(cart)
    }
}

fn ensure_stock(material: &Material, wanted: u32) -> Result<()> {
    let available = material.stock().value();
    if wanted > available {
        return Err(MaterialError::InsufficientStock { available, requested: wanted }.into());
    }
    Ok(())
}
