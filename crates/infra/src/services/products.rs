//! Product catalog service.

use std::collections::BTreeMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use thiserror::Error;
use tracing::info;

use storefront_core::{DomainError, Entity, ProductId};
use storefront_events::{ChangeKind, EventBus};
use storefront_products::{Product, ProductDraft};

use crate::error::StoreError;
use crate::producer::ChangeProducer;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("product {0} not found")]
    NotFound(ProductId),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub trait ProductRepository: Send + Sync {
    fn next_id(&self) -> Result<ProductId, StoreError>;
    fn save(&self, product: Product) -> Result<(), StoreError>;
    fn find(&self, id: ProductId) -> Result<Option<Product>, StoreError>;
    fn list(&self) -> Result<Vec<Product>, StoreError>;
    fn remove(&self, id: ProductId) -> Result<Option<Product>, StoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryProductRepository {
    rows: RwLock<BTreeMap<ProductId, Product>>,
    sequence: AtomicI64,
}

impl InMemoryProductRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProductRepository for InMemoryProductRepository {
    fn next_id(&self) -> Result<ProductId, StoreError> {
        Ok(ProductId::new(self.sequence.fetch_add(1, Ordering::SeqCst) + 1))
    }

    fn save(&self, product: Product) -> Result<(), StoreError> {
        let mut rows = self.rows.write().map_err(|_| StoreError::Poisoned)?;
        rows.insert(product.id(), product);
        Ok(())
    }

    fn find(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let rows = self.rows.read().map_err(|_| StoreError::Poisoned)?;
        Ok(rows.get(&id).cloned())
    }

    fn list(&self) -> Result<Vec<Product>, StoreError> {
        let rows = self.rows.read().map_err(|_| StoreError::Poisoned)?;
        Ok(rows.values().cloned().collect())
    }

    fn remove(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let mut rows = self.rows.write().map_err(|_| StoreError::Poisoned)?;
        Ok(rows.remove(&id))
    }
}

/// Owns product rows; every committed change goes out as a change event.
///
/// Deleting a product that order items still reference is not blocked here.
/// Callers ask the order side (`OrderService::product_exists`) first.
pub struct ProductService<R, B> {
    repository: R,
    producer: ChangeProducer<B>,
}

impl<R, B> ProductService<R, B>
where
    R: ProductRepository,
    B: EventBus,
{
    pub fn new(repository: R, producer: ChangeProducer<B>) -> Self {
        Self {
            repository,
            producer,
        }
    }

    pub fn create(&self, draft: ProductDraft) -> Result<Product, CatalogError> {
        draft.validate()?;
        let product = Product::create(self.repository.next_id()?, draft, Utc::now())?;
        self.repository.save(product.clone())?;

        info!(product_id = %product.id(), "product created");
        self.producer.publish(ChangeKind::Created, product.to_snapshot());
        Ok(product)
    }

    pub fn update(&self, id: ProductId, draft: ProductDraft) -> Result<Product, CatalogError> {
        let mut product = self.get(id)?;
        product.apply_draft(draft, Utc::now())?;
        self.repository.save(product.clone())?;

        info!(product_id = %id, "product updated");
        self.producer.publish(ChangeKind::Updated, product.to_snapshot());
        Ok(product)
    }

    pub fn delete(&self, id: ProductId) -> Result<(), CatalogError> {
        let removed = self.repository.remove(id)?.ok_or(CatalogError::NotFound(id))?;

        info!(product_id = %id, "product deleted");
        self.producer.publish(ChangeKind::Deleted, removed.to_snapshot());
        Ok(())
    }

    pub fn get(&self, id: ProductId) -> Result<Product, CatalogError> {
        self.repository.find(id)?.ok_or(CatalogError::NotFound(id))
    }

    pub fn list(&self) -> Result<Vec<Product>, CatalogError> {
        Ok(self.repository.list()?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use storefront_events::{ChangeEvent, InMemoryEventBus, ProductSnapshot, TopicConfig, TopicRouter};

    use super::*;

    fn service() -> (
        ProductService<InMemoryProductRepository, Arc<InMemoryEventBus>>,
        Arc<InMemoryEventBus>,
    ) {
        let bus = Arc::new(InMemoryEventBus::new());
        let producer = ChangeProducer::new(bus.clone(), TopicRouter::new(TopicConfig::default()));
        (
            ProductService::new(InMemoryProductRepository::new(), producer),
            bus,
        )
    }

    fn widget() -> ProductDraft {
        ProductDraft {
            name: "Widget".to_string(),
            quantity: 3,
            price: 9.99,
        }
    }

    fn kinds(bus: &InMemoryEventBus) -> Vec<ChangeKind> {
        bus.published("product-events")
            .iter()
            .map(|m| ChangeEvent::<ProductSnapshot>::from_json(&m.payload).unwrap().kind())
            .collect()
    }

    #[test]
    fn lifecycle_publishes_one_event_per_committed_change() {
        let (service, bus) = service();

        let product = service.create(widget()).unwrap();
        service
            .update(
                product.id(),
                ProductDraft {
                    quantity: 0,
                    ..widget()
                },
            )
            .unwrap();
        service.delete(product.id()).unwrap();

        assert_eq!(
            kinds(&bus),
            vec![ChangeKind::Created, ChangeKind::Updated, ChangeKind::Deleted]
        );
        assert!(service.list().unwrap().is_empty());
        let sent = bus.published("product-events");
        assert!(sent.iter().all(|m| m.key == product.id().to_string()));
    }

    #[test]
    fn negative_price_is_rejected_before_save() {
        let (service, bus) = service();
        let err = service
            .create(ProductDraft {
                price: -1.0,
                ..widget()
            })
            .unwrap_err();

        assert!(matches!(err, CatalogError::Domain(DomainError::Validation(_))));
        assert!(bus.published("product-events").is_empty());
    }

    #[test]
    fn failed_update_keeps_stored_row() {
        let (service, bus) = service();
        let product = service.create(widget()).unwrap();

        let err = service
            .update(
                product.id(),
                ProductDraft {
                    name: " ".to_string(),
                    ..widget()
                },
            )
            .unwrap_err();

        assert!(matches!(err, CatalogError::Domain(_)));
        assert_eq!(service.get(product.id()).unwrap(), product);
        assert_eq!(kinds(&bus), vec![ChangeKind::Created]);
    }

    #[test]
    fn missing_product_is_not_found() {
        let (service, _bus) = service();
        assert!(matches!(
            service.get(ProductId::new(5)),
            Err(CatalogError::NotFound(id)) if id == ProductId::new(5)
        ));
    }
}
