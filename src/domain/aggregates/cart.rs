//! Cart Aggregate

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::value_objects::{Money, MoneyError};

/// Upper bound on units of one material in a single cart line.
pub const MAX_LINE_QUANTITY: u32 = 999;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Cart {
    id: Uuid,
    user_id: Uuid,
    status: CartStatus,
    items: Vec<CartItem>,
    currency: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CartStatus { #[default] Active, CheckedOut }

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub material_id: Uuid,
    pub seller_id: Uuid,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Money,
}

impl CartItem {
    pub fn line_total(&self) -> Result<Money, MoneyError> { self.unit_price.multiply(self.quantity) }
}

crate::domain::versioned!(Cart);

impl Cart {
    pub fn for_user(user_id: Uuid, currency: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(), user_id, status: CartStatus::Active,
            items: vec![], currency: currency.to_string(),
            created_at: now, updated_at: now, version: 0,
        }
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn user_id(&self) -> Uuid { self.user_id }
    pub fn status(&self) -> CartStatus { self.status }
    pub fn items(&self) -> &[CartItem] { &self.items }
    pub fn currency(&self) -> &str { &self.currency }
    pub fn item_count(&self) -> usize { self.items.len() }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }
    pub fn item(&self, material_id: Uuid) -> Option<&CartItem> { self.items.iter().find(|i| i.material_id == material_id) }

    pub fn subtotal(&self) -> Result<Money, MoneyError> {
        self.items.iter().try_fold(Money::zero(&self.currency), |acc, i| acc.add(&i.line_total()?))
    }

    /// Adds a line, merging into the existing line for the same material.
    pub fn add_item(&mut self, item: CartItem) -> Result<(), CartError> {
        self.ensure_active()?;
        if item.quantity == 0 { return Err(CartError::InvalidQuantity); }
        if item.unit_price.currency() != self.currency { return Err(CartError::CurrencyMismatch); }
        if let Some(existing) = self.items.iter_mut().find(|i| i.material_id == item.material_id) {
            let merged = existing.quantity.saturating_add(item.quantity);
            if merged > MAX_LINE_QUANTITY { return Err(CartError::QuantityLimit); }
            existing.quantity = merged;
            existing.unit_price = item.unit_price;
            existing.name = item.name;
        } else {
            if item.quantity > MAX_LINE_QUANTITY { return Err(CartError::QuantityLimit); }
            self.items.push(item);
        }
        self.touch();
        Ok(())
    }

    /// Sets a line's quantity; zero removes the line.
    pub fn update_quantity(&mut self, material_id: Uuid, quantity: u32) -> Result<(), CartError> {
        self.ensure_active()?;
        if quantity > MAX_LINE_QUANTITY { return Err(CartError::QuantityLimit); }
        let item = self.items.iter_mut().find(|i| i.material_id == material_id).ok_or(CartError::ItemNotFound)?;
        if quantity == 0 { self.items.retain(|i| i.material_id != material_id); }
        else { item.quantity = quantity; }
        self.touch();
        Ok(())
    }

    pub fn remove_item(&mut self, material_id: Uuid) -> Result<(), CartError> {
        self.ensure_active()?;
        let before = self.items.len();
        self.items.retain(|i| i.material_id != material_id);
        if self.items.len() == before { return Err(CartError::ItemNotFound); }
        self.touch();
        Ok(())
    }

    pub fn clear(&mut self) { self.items.clear(); self.touch(); }

    /// Lines grouped per seller, in seller id order.
    pub fn items_by_seller(&self) -> BTreeMap<Uuid, Vec<CartItem>> {
        let mut groups: BTreeMap<Uuid, Vec<CartItem>> = BTreeMap::new();
        for item in &self.items {
            groups.entry(item.seller_id).or_default().push(item.clone());
        }
        groups
    }

    /// Drops checked-out lines. A cart emptied by checkout is closed; one
    /// with lines left stays active.
    pub fn remove_materials(&mut self, material_ids: &[Uuid]) {
        self.items.retain(|i| !material_ids.contains(&i.material_id));
        if self.items.is_empty() { self.status = CartStatus::CheckedOut; }
        self.touch();
    }

    fn ensure_active(&self) -> Result<(), CartError> {
        if self.status != CartStatus::Active { return Err(CartError::NotActive); }
        Ok(())
    }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CartError {
    #[error("item not found in cart")]
    ItemNotFound,
    #[error("quantity must be at least 1")]
    InvalidQuantity,
    #[error("at most 999 units per material")]
    QuantityLimit,
    #[error("item currency differs from cart currency")]
    CurrencyMismatch,
    #[error("cart is no longer active")]
    NotActive,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn item(material_id: Uuid, seller_id: Uuid, quantity: u32, price: i64) -> CartItem {
        CartItem { material_id, seller_id, name: "Hemp canvas".into(), quantity, unit_price: Money::vnd(Decimal::new(price, 0)) }
    }

    #[test]
    fn test_cart_operations() {
        let (m1, s1) = (Uuid::new_v4(), Uuid::new_v4());
        let mut cart = Cart::for_user(Uuid::new_v4(), "VND");
        cart.add_item(item(m1, s1, 2, 10)).unwrap();
        assert_eq!(cart.item_count(), 1);
        assert_eq!(cart.subtotal().unwrap().amount(), Decimal::new(20, 0));
        cart.add_item(item(m1, s1, 1, 10)).unwrap();
        assert_eq!(cart.items()[0].quantity, 3); // Merged
    }

    #[test]
    fn test_update_to_zero_removes_line() {
        let m1 = Uuid::new_v4();
        let mut cart = Cart::for_user(Uuid::new_v4(), "VND");
        cart.add_item(item(m1, Uuid::new_v4(), 2, 10)).unwrap();
        cart.update_quantity(m1, 0).unwrap();
        assert!(cart.is_empty());
        assert_eq!(cart.update_quantity(m1, 1), Err(CartError::ItemNotFound));
        assert_eq!(cart.remove_item(m1), Err(CartError::ItemNotFound));
    }

    #[test]
    fn test_rejects_zero_and_oversized_lines() {
        let m1 = Uuid::new_v4();
        let mut cart = Cart::for_user(Uuid::new_v4(), "VND");
        assert_eq!(cart.add_item(item(m1, Uuid::new_v4(), 0, 10)), Err(CartError::InvalidQuantity));
        cart.add_item(item(m1, Uuid::new_v4(), MAX_LINE_QUANTITY, 10)).unwrap();
        assert_eq!(cart.add_item(item(m1, Uuid::new_v4(), 1, 10)), Err(CartError::QuantityLimit));
    }

    #[test]
    fn test_rejects_foreign_currency() {
        let mut cart = Cart::for_user(Uuid::new_v4(), "VND");
        let mut usd = item(Uuid::new_v4(), Uuid::new_v4(), 1, 10);
        usd.unit_price = Money::new(Decimal::ONE, "USD");
        assert_eq!(cart.add_item(usd), Err(CartError::CurrencyMismatch));
    }

    #[test]
    fn test_items_by_seller_and_partial_checkout() {
        let (s1, s2) = (Uuid::new_v4(), Uuid::new_v4());
        let (m1, m2, m3) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let mut cart = Cart::for_user(Uuid::new_v4(), "VND");
        cart.add_item(item(m1, s1, 1, 10)).unwrap();
        cart.add_item(item(m2, s2, 1, 20)).unwrap();
        cart.add_item(item(m3, s1, 1, 30)).unwrap();

        let groups = cart.items_by_seller();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[&s1].len(), 2);
        assert_eq!(groups[&s2].len(), 1);

        cart.remove_materials(&[m1, m3]);
        assert_eq!(cart.item_count(), 1);
        assert_eq!(cart.items()[0].material_id, m2);
        assert_eq!(cart.status(), CartStatus::Active);

        cart.remove_materials(&[m2]);
        assert_eq!(cart.status(), CartStatus::CheckedOut);
        assert_eq!(cart.add_item(item(m1, s1, 1, 10)), Err(CartError::NotActive));
    }
}
