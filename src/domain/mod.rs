//! Marketplace domain model

use uuid::Uuid;

/// Aggregates persisted with optimistic concurrency.
///
/// `version` is the revision the aggregate was loaded at; zero means it has
/// never been stored.
pub trait Versioned {
    fn id(&self) -> Uuid;
    fn version(&self) -> i64;
    fn set_version(&mut self, version: i64);
}

macro_rules! versioned {
    ($ty:ty) => {
        impl $crate::domain::Versioned for $ty {
            fn id(&self) -> uuid::Uuid { self.id }
            fn version(&self) -> i64 { self.version }
            fn set_version(&mut self, version: i64) { self.version = version; }
        }
    };
}
pub(crate) use versioned;

pub mod aggregates;
pub mod events;
pub mod value_objects;
