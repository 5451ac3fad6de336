use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storefront_core::{DomainError, DomainResult, Entity, ProductId};
use storefront_events::ProductSnapshot;

/// Input for creating or replacing a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductDraft {
    pub name: String,
    /// Units in stock.
    pub quantity: i32,
    pub price: f64,
}

impl ProductDraft {
    pub fn validate(&self) -> DomainResult<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if self.quantity < 0 {
            return Err(DomainError::validation("quantity cannot be negative"));
        }
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(DomainError::validation(
                "price must be a non-negative number",
            ));
        }
        Ok(())
    }
}

/// A product as persisted by the product service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    id: ProductId,
    name: String,
    quantity: i32,
    price: f64,
    date_created: DateTime<Utc>,
    last_updated: DateTime<Utc>,
}

impl Product {
    pub fn create(id: ProductId, draft: ProductDraft, now: DateTime<Utc>) -> DomainResult<Self> {
        draft.validate()?;
        Ok(Self {
            id,
            name: draft.name,
            quantity: draft.quantity,
            price: draft.price,
            date_created: now,
            last_updated: now,
        })
    }

    pub fn apply_draft(&mut self, draft: ProductDraft, now: DateTime<Utc>) -> DomainResult<()> {
        draft.validate()?;
        self.name = draft.name;
        self.quantity = draft.quantity;
        self.price = draft.price;
        self.last_updated = now;
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn quantity(&self) -> i32 {
        self.quantity
    }

    pub fn price(&self) -> f64 {
        self.price
    }

    pub fn date_created(&self) -> DateTime<Utc> {
        self.date_created
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    pub fn to_snapshot(&self) -> ProductSnapshot {
        ProductSnapshot {
            product_id: self.id,
            name: self.name.clone(),
            quantity: self.quantity,
            price: self.price,
        }
    }
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> ProductId {
        self.id
    }
}
