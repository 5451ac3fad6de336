//! Change events, topic routing and bus mechanics.
//!
//! This crate is the contract shared by owning services (producers) and
//! dependent services (consumers). It does no IO of its own; transports
//! implement [`EventBus`] elsewhere.

pub mod bus;
pub mod in_memory_bus;
pub mod schema;
pub mod topic;

pub use bus::{Delivery, EventBus, KeyedMessage, Subscription, SubscriptionSpec};
pub use in_memory_bus::{DeadLetter, InMemoryBusError, InMemoryEventBus};
pub use schema::{
    Address, ChangeEvent, ChangeKind, CustomerSnapshot, ProductSnapshot, Rejection, Snapshot,
};
pub use topic::{ConsumerGroup, EntityType, Route, TopicConfig, TopicRouter, partition_for};
