use tracing::info;

use storefront_core::{OrderId, OrderItemId, ProductId};
use storefront_orders::{
    CustomerReplica, Order, OrderDraft, OrderItem, OrderLine, OrderStatus, ProductReplica,
    ReferencedWarning,
};

use super::{OrderServiceError, OrderStore};
use crate::replica_store::ReplicaStore;

type Result<T> = std::result::Result<T, OrderServiceError>;

/// Aggregate service for orders.
///
/// Reads customer/product replicas with plain (non-locking) lookups. A
/// replica may change between the check and the order write; that race is
/// accepted. Replicas are never written from here.
pub struct OrderService<O, C, P> {
    orders: O,
    customers: C,
    products: P,
}

impl<O, C, P> OrderService<O, C, P>
where
    O: OrderStore,
    C: ReplicaStore<CustomerReplica>,
    P: ReplicaStore<ProductReplica>,
{
    pub fn new(orders: O, customers: C, products: P) -> Self {
        Self {
            orders,
            customers,
            products,
        }
    }

    /// Resolve every reference, then write order and items together.
    ///
    /// Fails with not-found (and writes nothing) when the customer or any
    /// product has no replica.
    pub fn create_order(&self, draft: &OrderDraft) -> Result<Order> {
        draft.validate()?;
        self.resolve_references(draft)?;

        let order = self.orders.insert(draft)?;
        info!(
            order_id = %order.id,
            customer_id = %order.customer_id,
            items = order.item_ids.len(),
            "order created"
        );
        Ok(order)
    }

    /// Full replacement: the previous items are deleted and the draft's
    /// lines inserted as new items.
    pub fn update_order(&self, id: OrderId, draft: &OrderDraft) -> Result<Order> {
        draft.validate()?;
        if self.orders.find_order(id)?.is_none() {
            return Err(OrderServiceError::not_found(format!("order {id}")));
        }
        self.resolve_references(draft)?;

        let order = self
            .orders
            .replace(id, draft)?
            .ok_or_else(|| OrderServiceError::not_found(format!("order {id}")))?;
        info!(
            order_id = %order.id,
            customer_id = %order.customer_id,
            items = order.item_ids.len(),
            "order updated"
        );
        Ok(order)
    }

    /// Items go first, then the order.
    pub fn delete_order(&self, id: OrderId) -> Result<()> {
        if !self.orders.delete(id)? {
            return Err(OrderServiceError::not_found(format!("order {id}")));
        }
        info!(order_id = %id, "order deleted");
        Ok(())
    }

    pub fn get_order(&self, id: OrderId) -> Result<Order> {
        self.orders
            .find_order(id)?
            .ok_or_else(|| OrderServiceError::not_found(format!("order {id}")))
    }

    pub fn list_orders(&self) -> Result<Vec<Order>> {
        Ok(self.orders.list_orders()?)
    }

    pub fn get_item(&self, id: OrderItemId) -> Result<OrderItem> {
        self.orders
            .find_item(id)?
            .ok_or_else(|| OrderServiceError::not_found(format!("order item {id}")))
    }

    pub fn list_items(&self) -> Result<Vec<OrderItem>> {
        Ok(self.orders.list_items()?)
    }

    pub fn items_of(&self, order: OrderId) -> Result<Vec<OrderItem>> {
        Ok(self.orders.items_of(order)?)
    }

    /// Attach a single item to an existing order.
    pub fn create_item(&self, order: OrderId, line: OrderLine) -> Result<OrderItem> {
        line.validate()?;
        self.require_order(order)?;
        self.require_product(line.product_id)?;

        let item = self
            .orders
            .insert_item(order, line)?
            .ok_or_else(|| OrderServiceError::not_found(format!("order {order}")))?;
        info!(item_id = %item.id, order_id = %order, "order item created");
        Ok(item)
    }

    /// Overwrite one item; `order` may differ from its current owner.
    pub fn update_item(&self, id: OrderItemId, order: OrderId, line: OrderLine) -> Result<OrderItem> {
        line.validate()?;
        if self.orders.find_item(id)?.is_none() {
            return Err(OrderServiceError::not_found(format!("order item {id}")));
        }
        self.require_order(order)?;
        self.require_product(line.product_id)?;

        let item = self
            .orders
            .update_item(id, order, line)?
            .ok_or_else(|| OrderServiceError::not_found(format!("order item {id}")))?;
        info!(item_id = %id, order_id = %order, "order item updated");
        Ok(item)
    }

    pub fn delete_item(&self, id: OrderItemId) -> Result<()> {
        if !self.orders.delete_item(id)? {
            return Err(OrderServiceError::not_found(format!("order item {id}")));
        }
        info!(item_id = %id, "order item deleted");
        Ok(())
    }

    pub fn status_exists(&self, status: OrderStatus) -> Result<bool> {
        Ok(self.orders.exists_by_status(status)?)
    }

    pub fn exists_by_order_id(&self, order: OrderId) -> Result<bool> {
        Ok(self.orders.exists_by_order_id(order)?)
    }

    /// Whether any order item still references `product`.
    ///
    /// Callers deleting a product check this first and warn instead.
    pub fn product_exists(&self, product: ProductId) -> Result<bool> {
        Ok(self.orders.exists_by_product_id(product)?)
    }

    /// Soft guard before deleting an order that still has items.
    pub fn referenced_warning(&self, id: OrderId) -> Result<Option<ReferencedWarning>> {
        if self.orders.find_order(id)?.is_none() {
            return Err(OrderServiceError::not_found(format!("order {id}")));
        }
        Ok(self
            .orders
            .first_item_of(id)?
            .map(ReferencedWarning::order_item))
    }

    fn resolve_references(&self, draft: &OrderDraft) -> Result<()> {
        if !self.customers.exists(draft.customer_id)? {
            return Err(OrderServiceError::not_found(format!(
                "customer {}",
                draft.customer_id
            )));
        }
        for line in &draft.items {
            self.require_product(line.product_id)?;
        }
        Ok(())
    }

    fn require_order(&self, id: OrderId) -> Result<()> {
        if self.orders.find_order(id)?.is_none() {
            return Err(OrderServiceError::not_found(format!("order {id}")));
        }
        Ok(())
    }

    fn require_product(&self, id: ProductId) -> Result<()> {
        if !self.products.exists(id)? {
            return Err(OrderServiceError::not_found(format!("product {id}")));
        }
        Ok(())
    }
}
