//! Material Aggregate
//!
//! A supplier's or designer's listing: the thing a cart line points at.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::value_objects::{Money, Quantity};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Material {
    id: Uuid,
    seller_id: Uuid,
    name: String,
    unit_price: Money,
    stock: Quantity,
    status: MaterialStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaterialStatus { #[default] Draft, Active, Archived }

crate::domain::versioned!(Material);

impl Material {
    pub fn create(id: Uuid, seller_id: Uuid, name: impl Into<String>, unit_price: Money) -> Self {
        let now = Utc::now();
        Self {
            id, seller_id, name: name.into(), unit_price, stock: Quantity::default(),
            status: MaterialStatus::Draft, created_at: now, updated_at: now, version: 0,
        }
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn seller_id(&self) -> Uuid { self.seller_id }
    pub fn name(&self) -> &str { &self.name }
    pub fn unit_price(&self) -> &Money { &self.unit_price }
    pub fn stock(&self) -> Quantity { self.stock }
    pub fn status(&self) -> MaterialStatus { self.status }
    pub fn is_purchasable(&self) -> bool { self.status == MaterialStatus::Active && !self.stock.is_zero() }

    pub fn publish(&mut self) -> Result<(), MaterialError> {
        if self.name.trim().is_empty() { return Err(MaterialError::MissingName); }
        if !self.unit_price.is_positive() { return Err(MaterialError::InvalidPrice); }
        self.status = MaterialStatus::Active;
        self.touch();
        Ok(())
    }

    pub fn archive(&mut self) { self.status = MaterialStatus::Archived; self.touch(); }

    pub fn rename(&mut self, name: impl Into<String>) { self.name = name.into(); self.touch(); }

    pub fn update_price(&mut self, new_price: Money) -> Result<(), MaterialError> {
        if !new_price.is_positive() { return Err(MaterialError::InvalidPrice); }
        self.unit_price = new_price;
        self.touch();
        Ok(())
    }

    pub fn restock(&mut self, qty: u32) { self.stock = self.stock.add(qty); self.touch(); }

    /// Takes `qty` units out of sellable stock for a checkout session.
    pub fn reserve(&mut self, qty: u32) -> Result<(), MaterialError> {
        self.stock = self.stock.subtract(qty).ok_or(MaterialError::InsufficientStock { available: self.stock.value(), requested: qty })?;
        self.touch();
        Ok(())
    }

    /// Returns units held by an expired or cancelled order.
    pub fn release(&mut self, qty: u32) { self.restock(qty); }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MaterialError {
    #[error("material name is required")]
    MissingName,
    #[error("material price must be positive")]
    InvalidPrice,
    #[error("insufficient stock: {available} available, {requested} requested")]
    InsufficientStock { available: u32, requested: u32 },
}
