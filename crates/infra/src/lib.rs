//! Infrastructure layer: transports, stores, config and the services that
//! tie the change-event flow together.
//!
//! Owning side: [`services`] commit locally, then publish through
//! [`producer::ChangeProducer`]. Dependent side: [`replication`] runs one
//! [`workers::ConsumerWorker`] per partition that folds events into a
//! [`replica_store::ReplicaStore`] via [`reconciler::ReplicaReconciler`];
//! [`orders::OrderService`] reads those replicas.

pub mod config;
pub mod error;
pub mod event_bus;
pub mod orders;
pub mod producer;
pub mod reconciler;
pub mod replica_store;
pub mod replication;
pub mod services;
pub mod workers;

pub use config::ReplicationConfig;
pub use error::StoreError;
pub use orders::{OrderService, OrderServiceError, OrderStore};
pub use producer::{ChangeProducer, PublishError};
pub use reconciler::{ReconcileError, ReplicaReconciler};
pub use replica_store::{ReplicaStore, ReplicaWrite};
pub use replication::{Replication, ReplicationHandle};

#[cfg(test)]
mod integration_tests;
