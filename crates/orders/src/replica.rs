//! Local, non-authoritative copies of foreign-owned entities.
//!
//! A replica's identity is always the owning service's identity, taken from
//! the change event. Nothing in this module generates identities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storefront_core::{CustomerId, Entity, ProductId};
use storefront_events::{Address, CustomerSnapshot, ProductSnapshot, Snapshot};

/// A row type that mirrors exactly the fields of one snapshot type.
pub trait Replica:
    Entity
    + Clone
    + PartialEq
    + core::fmt::Debug
    + Send
    + Sync
    + 'static
{
    type Snapshot: Snapshot<Id = <Self as Entity>::Id>;

    /// Copy every snapshot field, identity included.
    fn from_snapshot(snapshot: Self::Snapshot) -> Self;
}

/// Customer replica held by the order service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerReplica {
    pub id: CustomerId,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub shipping_address: Option<Address>,
    pub billing_address: Option<Address>,
}

impl Entity for CustomerReplica {
    type Id = CustomerId;

    fn id(&self) -> CustomerId {
        self.id
    }
}

impl Replica for CustomerReplica {
    type Snapshot = CustomerSnapshot;

    fn from_snapshot(snapshot: CustomerSnapshot) -> Self {
        Self {
            id: snapshot.customer_id,
            name: snapshot.name,
            email: snapshot.email,
            phone: snapshot.phone,
            shipping_address: snapshot.shipping_address,
            billing_address: snapshot.billing_address,
        }
    }
}

/// Product replica held by the order service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductReplica {
    pub id: ProductId,
    pub name: String,
    pub quantity: i32,
    pub price: f64,
}

impl Entity for ProductReplica {
    type Id = ProductId;

    fn id(&self) -> ProductId {
        self.id
    }
}

impl Replica for ProductReplica {
    type Snapshot = ProductSnapshot;

    fn from_snapshot(snapshot: ProductSnapshot) -> Self {
        Self {
            id: snapshot.product_id,
            name: snapshot.name,
            quantity: snapshot.quantity,
            price: snapshot.price,
        }
    }
}

/// A replica row plus the bookkeeping the local store maintains for it.
///
/// Timestamps are local: they record when this service created/last
/// overwrote the row, not when the owner changed the entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Replicated<R> {
    pub row: R,
    pub date_created: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl<R: Replica> Replicated<R> {
    pub fn new(row: R, now: DateTime<Utc>) -> Self {
        Self {
            row,
            date_created: now,
            last_updated: now,
        }
    }

    /// Replace the row's fields. The identity stays the same.
    pub fn overwrite(&mut self, row: R, now: DateTime<Utc>) {
        debug_assert_eq!(self.row.id(), row.id());
        self.row = row;
        self.last_updated = now;
    }

    pub fn id(&self) -> R::Id {
        self.row.id()
    }
}
