//! Topic routing: entity type → topic, key → partition.
//!
//! Topic names are configuration, never hardcoded at call sites. Producers and
//! consumers of the same entity type must be built from the same
//! [`TopicConfig`] so they agree on the resolved name.

use serde::{Deserialize, Serialize};

const DEFAULT_CUSTOMER_TOPIC: &str = "customer-events";
const DEFAULT_PRODUCT_TOPIC: &str = "product-events";
const DEFAULT_PARTITIONS: u32 = 3;

/// Entity types that are published as change events.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Customer,
    Product,
}

impl EntityType {
    pub const ALL: [EntityType; 2] = [EntityType::Customer, EntityType::Product];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Customer => "customer",
            EntityType::Product => "product",
        }
    }
}

impl core::fmt::Display for EntityType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared topic configuration (one topic per entity type).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicConfig {
    #[serde(default = "default_customer_topic")]
    pub customer_events: String,
    #[serde(default = "default_product_topic")]
    pub product_events: String,
    /// Partitions per topic. Same-key events always map to the same partition.
    #[serde(default = "default_partitions")]
    pub partitions: u32,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            customer_events: default_customer_topic(),
            product_events: default_product_topic(),
            partitions: default_partitions(),
        }
    }
}

fn default_customer_topic() -> String {
    DEFAULT_CUSTOMER_TOPIC.to_string()
}

fn default_product_topic() -> String {
    DEFAULT_PRODUCT_TOPIC.to_string()
}

fn default_partitions() -> u32 {
    DEFAULT_PARTITIONS
}

/// Where a keyed message goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub topic: String,
    pub partition: u32,
}

/// Resolves topics and partitions from a [`TopicConfig`].
#[derive(Debug, Clone)]
pub struct TopicRouter {
    config: TopicConfig,
}

impl TopicRouter {
    pub fn new(mut config: TopicConfig) -> Self {
        config.partitions = config.partitions.max(1);
        Self { config }
    }

    pub fn config(&self) -> &TopicConfig {
        &self.config
    }

    pub fn topic_for(&self, entity: EntityType) -> &str {
        match entity {
            EntityType::Customer => &self.config.customer_events,
            EntityType::Product => &self.config.product_events,
        }
    }

    pub fn partitions(&self) -> u32 {
        self.config.partitions
    }

    pub fn route(&self, entity: EntityType, key: &str) -> Route {
        Route {
            topic: self.topic_for(entity).to_string(),
            partition: partition_for(key, self.config.partitions),
        }
    }
}

impl Default for TopicRouter {
    fn default() -> Self {
        Self::new(TopicConfig::default())
    }
}

/// Stable key → partition mapping (FNV-1a, 32 bit).
///
/// Must not depend on process-local hashing state: every producer instance has
/// to pick the same partition for the same key.
pub fn partition_for(key: &str, partitions: u32) -> u32 {
    const OFFSET_BASIS: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;

    let hash = key
        .bytes()
        .fold(OFFSET_BASIS, |acc, b| (acc ^ u32::from(b)).wrapping_mul(PRIME));
    hash % partitions.max(1)
}

/// Consumer group of one dependent service for one entity type.
///
/// Each (service, entity type) pair tracks its own position independently,
/// e.g. `order-service-customer`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConsumerGroup(String);

impl ConsumerGroup {
    pub fn new(service: &str, entity: EntityType) -> Self {
        Self(format!("{service}-{}", entity.as_str()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for ConsumerGroup {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
