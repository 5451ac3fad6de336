use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::Utc;

use storefront_core::{OrderId, OrderItemId, ProductId};
use storefront_orders::{Order, OrderDraft, OrderItem, OrderLine, OrderStatus};

use super::OrderStore;
use crate::error::StoreError;

#[derive(Debug, Default)]
struct State {
    orders: BTreeMap<OrderId, Order>,
    items: BTreeMap<OrderItemId, OrderItem>,
    last_order: i64,
    last_item: i64,
}

impl State {
    fn next_item_id(&mut self) -> OrderItemId {
        self.last_item += 1;
        OrderItemId::new(self.last_item)
    }

    /// Build the draft's items for `order`, all or nothing.
    fn build_items(&mut self, order: &mut Order, draft: &OrderDraft) -> Result<Vec<OrderItem>, StoreError> {
        let now = order.last_updated;
        let mut items = Vec::with_capacity(draft.items.len());
        for line in &draft.items {
            let id = self.next_item_id();
            let item = OrderItem::new(id, order.id, *line, now)
                .map_err(|e| StoreError::Constraint(e.to_string()))?;
            order.add_item(id);
            items.push(item);
        }
        Ok(items)
    }
}

/// In-memory order store for tests/dev. The mutex is the transaction.
#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    state: Mutex<State>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, State>, StoreError> {
        self.state.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl OrderStore for InMemoryOrderStore {
    fn find_order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        Ok(self.lock()?.orders.get(&id).cloned())
    }

    fn list_orders(&self) -> Result<Vec<Order>, StoreError> {
        Ok(self.lock()?.orders.values().cloned().collect())
    }

    fn find_item(&self, id: OrderItemId) -> Result<Option<OrderItem>, StoreError> {
        Ok(self.lock()?.items.get(&id).cloned())
    }

    fn list_items(&self) -> Result<Vec<OrderItem>, StoreError> {
        Ok(self.lock()?.items.values().cloned().collect())
    }

    fn items_of(&self, order: OrderId) -> Result<Vec<OrderItem>, StoreError> {
        Ok(self
            .lock()?
            .items
            .values()
            .filter(|i| i.order_id == order)
            .cloned()
            .collect())
    }

    fn exists_by_order_id(&self, order: OrderId) -> Result<bool, StoreError> {
        Ok(self.lock()?.items.values().any(|i| i.order_id == order))
    }

    fn exists_by_product_id(&self, product: ProductId) -> Result<bool, StoreError> {
        Ok(self.lock()?.items.values().any(|i| i.product_id == product))
    }

    fn first_item_of(&self, order: OrderId) -> Result<Option<OrderItemId>, StoreError> {
        Ok(self
            .lock()?
            .items
            .values()
            .find(|i| i.order_id == order)
            .map(|i| i.id))
    }

    fn exists_by_status(&self, status: OrderStatus) -> Result<bool, StoreError> {
        Ok(self.lock()?.orders.values().any(|o| o.status == status))
    }

    fn insert(&self, draft: &OrderDraft) -> Result<Order, StoreError> {
        let mut state = self.lock()?;

        let mut order = Order::new(
            OrderId::new(state.last_order + 1),
            draft.status,
            draft.customer_id,
            Utc::now(),
        );
        // Build everything before touching the maps.
        let items = state.build_items(&mut order, draft)?;

        state.last_order += 1;
        state.items.extend(items.into_iter().map(|i| (i.id, i)));
        state.orders.insert(order.id, order.clone());
        Ok(order)
    }

    fn replace(&self, id: OrderId, draft: &OrderDraft) -> Result<Option<Order>, StoreError> {
        let mut state = self.lock()?;

        let Some(mut order) = state.orders.get(&id).cloned() else {
            return Ok(None);
        };
        order.reset(draft.status, draft.customer_id, Utc::now());
        let items = state.build_items(&mut order, draft)?;

        state.items.retain(|_, item| item.order_id != id);
        state.items.extend(items.into_iter().map(|i| (i.id, i)));
        state.orders.insert(id, order.clone());
        Ok(Some(order))
    }

    fn delete(&self, id: OrderId) -> Result<bool, StoreError> {
        let mut state = self.lock()?;
        if !state.orders.contains_key(&id) {
            return Ok(false);
        }
        state.items.retain(|_, item| item.order_id != id);
        state.orders.remove(&id);
        Ok(true)
    }

    fn insert_item(&self, order: OrderId, line: OrderLine) -> Result<Option<OrderItem>, StoreError> {
        let mut state = self.lock()?;
        if !state.orders.contains_key(&order) {
            return Ok(None);
        }
        let item = OrderItem::new(OrderItemId::new(state.last_item + 1), order, line, Utc::now())
            .map_err(|e| StoreError::Constraint(e.to_string()))?;

        state.last_item += 1;
        if let Some(owner) = state.orders.get_mut(&order) {
            owner.add_item(item.id);
        }
        state.items.insert(item.id, item.clone());
        Ok(Some(item))
    }

    fn update_item(
        &self,
        id: OrderItemId,
        order: OrderId,
        line: OrderLine,
    ) -> Result<Option<OrderItem>, StoreError> {
        let mut state = self.lock()?;
        if !state.orders.contains_key(&order) {
            return Ok(None);
        }
        let Some(mut item) = state.items.get(&id).cloned() else {
            return Ok(None);
        };
        let previous = item.order_id;
        item.apply_line(order, line, Utc::now())
            .map_err(|e| StoreError::Constraint(e.to_string()))?;

        if let Some(owner) = state.orders.get_mut(&previous) {
            owner.remove_item(id);
        }
        if let Some(owner) = state.orders.get_mut(&order) {
            owner.add_item(id);
        }
        state.items.insert(id, item.clone());
        Ok(Some(item))
    }

    fn delete_item(&self, id: OrderItemId) -> Result<bool, StoreError> {
        let mut state = self.lock()?;
        let Some(item) = state.items.remove(&id) else {
            return Ok(false);
        };
        if let Some(owner) = state.orders.get_mut(&item.order_id) {
            owner.remove_item(id);
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use storefront_core::CustomerId;
    use storefront_orders::{OrderLine, OrderStatus};

    use super::*;

    fn line(product: i64, quantity: i32) -> OrderLine {
        OrderLine {
            product_id: ProductId::new(product),
            quantity,
        }
    }

    fn draft(items: Vec<OrderLine>) -> OrderDraft {
        OrderDraft {
            status: OrderStatus::New,
            customer_id: CustomerId::new(1),
            items,
        }
    }

    #[test]
    fn insert_assigns_sequential_identities() {
        let store = InMemoryOrderStore::new();
        let a = store.insert(&draft(vec![line(7, 1), line(8, 1)])).unwrap();
        let b = store.insert(&draft(vec![line(7, 1)])).unwrap();

        assert_eq!(a.id, OrderId::new(1));
        assert_eq!(b.id, OrderId::new(2));
        assert_eq!(a.item_ids, vec![OrderItemId::new(1), OrderItemId::new(2)]);
        assert_eq!(b.item_ids, vec![OrderItemId::new(3)]);
        assert_eq!(store.first_item_of(a.id).unwrap(), Some(OrderItemId::new(1)));
    }

    #[test]
    fn rejected_line_leaves_store_untouched() {
        let store = InMemoryOrderStore::new();
        let err = store.insert(&draft(vec![line(7, 1), line(8, 0)])).unwrap_err();

        assert!(matches!(err, StoreError::Constraint(_)));
        assert!(store.list_orders().unwrap().is_empty());
        assert!(store.list_items().unwrap().is_empty());
    }

    #[test]
    fn replace_of_missing_order_is_none() {
        let store = InMemoryOrderStore::new();
        assert_eq!(store.replace(OrderId::new(3), &draft(vec![])).unwrap(), None);
    }

    #[test]
    fn item_writes_keep_owner_item_ids_in_sync() {
        let store = InMemoryOrderStore::new();
        let a = store.insert(&draft(vec![line(7, 1)])).unwrap();
        let b = store.insert(&draft(vec![])).unwrap();

        let added = store.insert_item(a.id, line(8, 2)).unwrap().unwrap();
        assert_eq!(added.id, OrderItemId::new(2));
        assert_eq!(
            store.find_order(a.id).unwrap().unwrap().item_ids,
            vec![OrderItemId::new(1), added.id]
        );

        let moved = store.update_item(added.id, b.id, line(9, 5)).unwrap().unwrap();
        assert_eq!(moved.order_id, b.id);
        assert_eq!(moved.product_id, ProductId::new(9));
        assert_eq!(store.find_order(a.id).unwrap().unwrap().item_ids, vec![OrderItemId::new(1)]);
        assert_eq!(store.find_order(b.id).unwrap().unwrap().item_ids, vec![added.id]);

        assert!(store.delete_item(added.id).unwrap());
        assert!(!store.delete_item(added.id).unwrap());
        assert!(!store.find_order(b.id).unwrap().unwrap().has_items());
        assert!(!store.exists_by_order_id(b.id).unwrap());
    }

    #[test]
    fn item_writes_against_missing_rows_are_none() {
        let store = InMemoryOrderStore::new();
        let order = store.insert(&draft(vec![line(7, 1)])).unwrap();

        assert_eq!(store.insert_item(OrderId::new(9), line(7, 1)).unwrap(), None);
        assert_eq!(
            store.update_item(OrderItemId::new(9), order.id, line(7, 1)).unwrap(),
            None
        );
        assert_eq!(
            store.update_item(order.item_ids[0], OrderId::new(9), line(7, 1)).unwrap(),
            None
        );
        assert!(matches!(
            store.insert_item(order.id, line(7, 0)),
            Err(StoreError::Constraint(_))
        ));
        assert_eq!(store.list_items().unwrap().len(), 1);
    }

    #[test]
    fn status_lookup_matches_stored_orders() {
        let store = InMemoryOrderStore::new();
        store.insert(&draft(vec![])).unwrap();

        assert!(store.exists_by_status(OrderStatus::New).unwrap());
        assert!(!store.exists_by_status(OrderStatus::Shipped).unwrap());
    }

    #[test]
    fn delete_cascades_to_items_only_of_that_order() {
        let store = InMemoryOrderStore::new();
        let a = store.insert(&draft(vec![line(7, 1), line(8, 2)])).unwrap();
        let b = store.insert(&draft(vec![line(7, 1)])).unwrap();

        assert!(store.delete(a.id).unwrap());
        assert!(!store.delete(a.id).unwrap());

        assert!(!store.exists_by_order_id(a.id).unwrap());
        assert!(store.exists_by_order_id(b.id).unwrap());
        assert!(store.exists_by_product_id(ProductId::new(7)).unwrap());
        assert!(!store.exists_by_product_id(ProductId::new(8)).unwrap());
    }
}
