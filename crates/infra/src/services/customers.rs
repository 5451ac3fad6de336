//! Customer service: owns customer rows and announces every committed change.

use std::collections::BTreeMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use thiserror::Error;
use tracing::info;

use storefront_core::{CustomerId, DomainError, Entity};
use storefront_customers::{Customer, CustomerDraft};
use storefront_events::{ChangeKind, EventBus};

use crate::error::StoreError;
use crate::producer::ChangeProducer;

#[derive(Debug, Error)]
pub enum CustomerServiceError {
    #[error("customer {0} not found")]
    NotFound(CustomerId),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub trait CustomerRepository: Send + Sync {
    fn next_id(&self) -> Result<CustomerId, StoreError>;

    /// Insert or overwrite by identity.
    fn save(&self, customer: Customer) -> Result<(), StoreError>;

    fn find(&self, id: CustomerId) -> Result<Option<Customer>, StoreError>;

    /// All customers, ordered by identity.
    fn list(&self) -> Result<Vec<Customer>, StoreError>;

    /// Remove and return the row as it was.
    fn remove(&self, id: CustomerId) -> Result<Option<Customer>, StoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryCustomerRepository {
    rows: RwLock<BTreeMap<CustomerId, Customer>>,
    sequence: AtomicI64,
}

impl InMemoryCustomerRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CustomerRepository for InMemoryCustomerRepository {
    fn next_id(&self) -> Result<CustomerId, StoreError> {
        Ok(CustomerId::new(self.sequence.fetch_add(1, Ordering::SeqCst) + 1))
    }

    fn save(&self, customer: Customer) -> Result<(), StoreError> {
        let mut rows = self.rows.write().map_err(|_| StoreError::Poisoned)?;
        rows.insert(customer.id(), customer);
        Ok(())
    }

    fn find(&self, id: CustomerId) -> Result<Option<Customer>, StoreError> {
        let rows = self.rows.read().map_err(|_| StoreError::Poisoned)?;
        Ok(rows.get(&id).cloned())
    }

    fn list(&self) -> Result<Vec<Customer>, StoreError> {
        let rows = self.rows.read().map_err(|_| StoreError::Poisoned)?;
        Ok(rows.values().cloned().collect())
    }

    fn remove(&self, id: CustomerId) -> Result<Option<Customer>, StoreError> {
        let mut rows = self.rows.write().map_err(|_| StoreError::Poisoned)?;
        Ok(rows.remove(&id))
    }
}

/// CRUD over customers. Publishes only after the repository call returned.
pub struct CustomerService<R, B> {
    repository: R,
    producer: ChangeProducer<B>,
}

impl<R, B> CustomerService<R, B>
where
    R: CustomerRepository,
    B: EventBus,
{
    pub fn new(repository: R, producer: ChangeProducer<B>) -> Self {
        Self {
            repository,
            producer,
        }
    }

    pub fn create(&self, draft: CustomerDraft) -> Result<Customer, CustomerServiceError> {
        draft.validate()?;
        let customer = Customer::create(self.repository.next_id()?, draft, Utc::now())?;
        self.repository.save(customer.clone())?;

        info!(customer_id = %customer.id(), "customer created");
        self.producer.publish(ChangeKind::Created, customer.to_snapshot());
        Ok(customer)
    }

    pub fn update(&self, id: CustomerId, draft: CustomerDraft) -> Result<Customer, CustomerServiceError> {
        let mut customer = self.get(id)?;
        customer.apply_draft(draft, Utc::now())?;
        self.repository.save(customer.clone())?;

        info!(customer_id = %id, "customer updated");
        self.producer.publish(ChangeKind::Updated, customer.to_snapshot());
        Ok(customer)
    }

    /// The published event carries the state as it was before removal.
    pub fn delete(&self, id: CustomerId) -> Result<(), CustomerServiceError> {
        let removed = self
            .repository
            .remove(id)?
            .ok_or(CustomerServiceError::NotFound(id))?;

        info!(customer_id = %id, "customer deleted");
        self.producer.publish(ChangeKind::Deleted, removed.to_snapshot());
        Ok(())
    }

    pub fn get(&self, id: CustomerId) -> Result<Customer, CustomerServiceError> {
        self.repository
            .find(id)?
            .ok_or(CustomerServiceError::NotFound(id))
    }

    pub fn list(&self) -> Result<Vec<Customer>, CustomerServiceError> {
        Ok(self.repository.list()?)
    }

    /// Case-insensitive.
    pub fn email_exists(&self, email: &str) -> Result<bool, CustomerServiceError> {
        let email = email.trim().to_lowercase();
        Ok(self
            .repository
            .list()?
            .iter()
            .any(|c| c.email().trim().to_lowercase() == email))
    }

    /// Case-insensitive.
    pub fn phone_exists(&self, phone: &str) -> Result<bool, CustomerServiceError> {
        let phone = phone.trim().to_lowercase();
        Ok(self
            .repository
            .list()?
            .iter()
            .any(|c| c.phone().trim().to_lowercase() == phone))
    }
}
