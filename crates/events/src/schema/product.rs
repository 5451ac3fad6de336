use serde::{Deserialize, Serialize};

use storefront_core::ProductId;

use crate::schema::Snapshot;
use crate::topic::EntityType;

/// Product state published by the product service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSnapshot {
    pub product_id: ProductId,
    pub name: String,
    pub quantity: i32,
    pub price: f64,
}

impl Snapshot for ProductSnapshot {
    type Id = ProductId;

    const ENTITY: EntityType = EntityType::Product;
    const ID_FIELD: &'static str = "productId";

    fn entity_id(&self) -> ProductId {
        self.product_id
    }
}
