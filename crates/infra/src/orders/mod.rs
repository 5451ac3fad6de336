//! Order aggregate: locally owned Order/OrderItem rows composed with
//! customer and product replicas.

use std::sync::Arc;

use thiserror::Error;

use storefront_core::{DomainError, OrderId, OrderItemId, ProductId};
use storefront_orders::{Order, OrderDraft, OrderItem, OrderLine, OrderStatus};

use crate::error::StoreError;

pub mod in_memory;
pub mod postgres;
pub mod service;

pub use in_memory::InMemoryOrderStore;
pub use postgres::PostgresOrderStore;
pub use service::OrderService;

/// Persistence of the order aggregate.
///
/// Every write covers the order row and all of its items in one transaction.
/// The store assigns identities and timestamps.
pub trait OrderStore: Send + Sync {
    fn find_order(&self, id: OrderId) -> Result<Option<Order>, StoreError>;

    /// All orders, ordered by identity.
    fn list_orders(&self) -> Result<Vec<Order>, StoreError>;

    fn find_item(&self, id: OrderItemId) -> Result<Option<OrderItem>, StoreError>;

    /// All items, ordered by identity.
    fn list_items(&self) -> Result<Vec<OrderItem>, StoreError>;

    /// Items owned by `order`, ordered by identity.
    fn items_of(&self, order: OrderId) -> Result<Vec<OrderItem>, StoreError>;

    /// Whether any item belongs to `order`.
    fn exists_by_order_id(&self, order: OrderId) -> Result<bool, StoreError>;

    /// Whether any item references `product`.
    fn exists_by_product_id(&self, product: ProductId) -> Result<bool, StoreError>;

    /// Lowest item identity of `order`, if it has items.
    fn first_item_of(&self, order: OrderId) -> Result<Option<OrderItemId>, StoreError>;

    /// Whether any order is in `status`.
    fn exists_by_status(&self, status: OrderStatus) -> Result<bool, StoreError>;

    /// Insert a new order with one item per draft line.
    fn insert(&self, draft: &OrderDraft) -> Result<Order, StoreError>;

    /// Overwrite status/customer and swap the whole item set for the draft's.
    ///
    /// `None` when the order does not exist.
    fn replace(&self, id: OrderId, draft: &OrderDraft) -> Result<Option<Order>, StoreError>;

    /// Delete the order's items, then the order. `false` when absent.
    fn delete(&self, id: OrderId) -> Result<bool, StoreError>;

    /// Attach one new item to `order`. `None` when the order does not exist.
    fn insert_item(&self, order: OrderId, line: OrderLine) -> Result<Option<OrderItem>, StoreError>;

    /// Overwrite an item, possibly moving it to another order.
    ///
    /// `None` when either the item or the target order does not exist.
    fn update_item(
        &self,
        id: OrderItemId,
        order: OrderId,
        line: OrderLine,
    ) -> Result<Option<OrderItem>, StoreError>;

    /// Remove one item. `false` when absent.
    fn delete_item(&self, id: OrderItemId) -> Result<bool, StoreError>;
}

impl<S: OrderStore + ?Sized> OrderStore for Arc<S> {
    fn find_order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        (**self).find_order(id)
    }

    fn list_orders(&self) -> Result<Vec<Order>, StoreError> {
        (**self).list_orders()
    }

    fn find_item(&self, id: OrderItemId) -> Result<Option<OrderItem>, StoreError> {
        (**self).find_item(id)
    }

    fn list_items(&self) -> Result<Vec<OrderItem>, StoreError> {
        (**self).list_items()
    }

    fn items_of(&self, order: OrderId) -> Result<Vec<OrderItem>, StoreError> {
        (**self).items_of(order)
    }

    fn exists_by_order_id(&self, order: OrderId) -> Result<bool, StoreError> {
        (**self).exists_by_order_id(order)
    }

    fn exists_by_product_id(&self, product: ProductId) -> Result<bool, StoreError> {
        (**self).exists_by_product_id(product)
    }

    fn first_item_of(&self, order: OrderId) -> Result<Option<OrderItemId>, StoreError> {
        (**self).first_item_of(order)
    }

    fn exists_by_status(&self, status: OrderStatus) -> Result<bool, StoreError> {
        (**self).exists_by_status(status)
    }

    fn insert(&self, draft: &OrderDraft) -> Result<Order, StoreError> {
        (**self).insert(draft)
    }

    fn replace(&self, id: OrderId, draft: &OrderDraft) -> Result<Option<Order>, StoreError> {
        (**self).replace(id, draft)
    }

    fn delete(&self, id: OrderId) -> Result<bool, StoreError> {
        (**self).delete(id)
    }

    fn insert_item(&self, order: OrderId, line: OrderLine) -> Result<Option<OrderItem>, StoreError> {
        (**self).insert_item(order, line)
    }

    fn update_item(
        &self,
        id: OrderItemId,
        order: OrderId,
        line: OrderLine,
    ) -> Result<Option<OrderItem>, StoreError> {
        (**self).update_item(id, order, line)
    }

    fn delete_item(&self, id: OrderItemId) -> Result<bool, StoreError> {
        (**self).delete_item(id)
    }
}

#[derive(Debug, Error)]
pub enum OrderServiceError {
    /// Client-visible: the order, item, or a referenced replica is absent.
    #[error("{0} not found")]
    NotFound(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl OrderServiceError {
    pub fn not_found(what: impl Into<String>) -> Self {
        OrderServiceError::NotFound(what.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, OrderServiceError::NotFound(_))
    }
}

impl From<DomainError> for OrderServiceError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::NotFound(what) => OrderServiceError::NotFound(what),
            other => OrderServiceError::Validation(other.to_string()),
        }
    }
}
