use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storefront_core::{CustomerId, DomainError, DomainResult, Entity, OrderId, OrderItemId, ProductId};

/// Message key of the warning returned while an order still has items.
pub const REFERENCED_WARNING_KEY: &str = "order.orderItem.orders.referenced";

/// Order status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "NEW",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(value: &str) -> DomainResult<Self> {
        match value {
            "NEW" => Ok(OrderStatus::New),
            "PROCESSING" => Ok(OrderStatus::Processing),
            "SHIPPED" => Ok(OrderStatus::Shipped),
            "DELIVERED" => Ok(OrderStatus::Delivered),
            "CANCELLED" => Ok(OrderStatus::Cancelled),
            other => Err(DomainError::validation(format!("unknown order status: {other}"))),
        }
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One requested line: a product replica reference and a quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub product_id: ProductId,
    pub quantity: i32,
}

impl OrderLine {
    pub fn validate(&self) -> DomainResult<()> {
        if self.quantity < 1 {
            return Err(DomainError::validation(format!(
                "quantity for product {} must be at least 1",
                self.product_id
            )));
        }
        Ok(())
    }
}

/// Input for creating or fully replacing an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDraft {
    pub status: OrderStatus,
    pub customer_id: CustomerId,
    #[serde(default)]
    pub items: Vec<OrderLine>,
}

impl OrderDraft {
    pub fn validate(&self) -> DomainResult<()> {
        self.items.iter().try_for_each(OrderLine::validate)
    }
}

/// Aggregate root row.
///
/// Owns its items by identity only (`item_ids`); each [`OrderItem`] points back
/// through `order_id`. There is no live object graph between the two.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub status: OrderStatus,
    /// Weak reference into the customer replica.
    pub customer_id: CustomerId,
    pub item_ids: Vec<OrderItemId>,
    pub date_created: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl Order {
    pub fn new(id: OrderId, status: OrderStatus, customer_id: CustomerId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            status,
            customer_id,
            item_ids: Vec::new(),
            date_created: now,
            last_updated: now,
        }
    }

    pub fn add_item(&mut self, item: OrderItemId) {
        if !self.item_ids.contains(&item) {
            self.item_ids.push(item);
        }
    }

    pub fn remove_item(&mut self, item: OrderItemId) {
        self.item_ids.retain(|id| *id != item);
    }

    /// Overwrite status/customer and drop every item reference.
    pub fn reset(&mut self, status: OrderStatus, customer_id: CustomerId, now: DateTime<Utc>) {
        self.status = status;
        self.customer_id = customer_id;
        self.item_ids.clear();
        self.last_updated = now;
    }

    pub fn has_items(&self) -> bool {
        !self.item_ids.is_empty()
    }
}

impl Entity for Order {
    type Id = OrderId;

    fn id(&self) -> OrderId {
        self.id
    }
}

/// Line item row, strongly owned by its order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    /// Owning order (back-reference, non-owning).
    pub order_id: OrderId,
    /// Weak reference into the product replica.
    pub product_id: ProductId,
    pub quantity: i32,
    pub date_created: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl OrderItem {
    pub fn new(id: OrderItemId, order_id: OrderId, line: OrderLine, now: DateTime<Utc>) -> DomainResult<Self> {
        if line.quantity < 1 {
            return Err(DomainError::validation("quantity must be at least 1"));
        }
        Ok(Self {
            id,
            order_id,
            product_id: line.product_id,
            quantity: line.quantity,
            date_created: now,
            last_updated: now,
        })
    }

    /// Move the item to `order_id` and take the line's product and quantity.
    pub fn apply_line(&mut self, order_id: OrderId, line: OrderLine, now: DateTime<Utc>) -> DomainResult<()> {
        line.validate()?;
        self.order_id = order_id;
        self.product_id = line.product_id;
        self.quantity = line.quantity;
        self.last_updated = now;
        Ok(())
    }
}

impl Entity for OrderItem {
    type Id = OrderItemId;

    fn id(&self) -> OrderItemId {
        self.id
    }
}

/// Soft guard returned instead of deleting something still referenced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferencedWarning {
    pub key: String,
    pub params: Vec<String>,
}

impl ReferencedWarning {
    pub fn order_item(item: OrderItemId) -> Self {
        Self {
            key: REFERENCED_WARNING_KEY.to_string(),
            params: vec![item.to_string()],
        }
    }
}
