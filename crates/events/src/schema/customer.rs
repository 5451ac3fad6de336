use serde::{Deserialize, Serialize};

use storefront_core::{CustomerId, ValueObject};

use crate::schema::Snapshot;
use crate::topic::EntityType;

/// Postal address embedded in customer records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[serde(default)]
    pub street: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub postal_code: String,
    #[serde(default)]
    pub country: String,
}

impl ValueObject for Address {}

impl Address {
    /// Single-line rendering, skipping blank parts.
    pub fn formatted(&self) -> String {
        let region = [self.state.trim(), self.postal_code.trim()]
            .into_iter()
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        [self.street.trim(), self.city.trim(), region.as_str(), self.country.trim()]
            .into_iter()
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Customer state published by the customer service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerSnapshot {
    pub customer_id: CustomerId,
    pub name: String,
    pub email: String,
    pub phone: String,
    #[serde(default)]
    pub shipping_address: Option<Address>,
    #[serde(default)]
    pub billing_address: Option<Address>,
}

impl Snapshot for CustomerSnapshot {
    type Id = CustomerId;

    const ENTITY: EntityType = EntityType::Customer;
    const ID_FIELD: &'static str = "customerId";

    fn entity_id(&self) -> CustomerId {
        self.customer_id
    }
}
