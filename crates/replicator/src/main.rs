//! Order-service replication daemon.
//!
//! Keeps `customers_replica` and `products_replica` in sync with the customer
//! and product change topics until Ctrl-C.

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tokio::runtime::Handle;
use tracing::info;

use storefront_infra::event_bus::RedisStreamsEventBus;
use storefront_infra::replica_store::PostgresReplicaStore;
use storefront_infra::{Replication, ReplicationConfig};
use storefront_orders::{CustomerReplica, ProductReplica};

#[tokio::main]
async fn main() -> Result<()> {
    storefront_observability::init();

    let config = ReplicationConfig::from_env()?;

    // One connection per worker plus headroom.
    let pool = PgPoolOptions::new()
        .max_connections(config.topics.partitions * 2 + 2)
        .connect(config.require_database_url()?)
        .await
        .context("failed to connect to Postgres")?;

    // Stores block on this runtime from the worker threads.
    let handle = Handle::current();
    let customers = Arc::new(PostgresReplicaStore::<CustomerReplica>::new(pool.clone(), handle.clone()));
    let products = Arc::new(PostgresReplicaStore::<ProductReplica>::new(pool, handle));

    let bus = Arc::new(
        RedisStreamsEventBus::new(&config.redis_url, config.stream_prefix.clone())
            .context("invalid REDIS_URL")?,
    );

    let start_config = config.clone();
    let replication = tokio::task::spawn_blocking(move || {
        Replication::start(&start_config, bus, customers, products)
    })
    .await
    .context("replication startup task failed")?
    .context("failed to subscribe to change topics")?;

    info!(
        service = %config.service_name,
        workers = replication.worker_count(),
        "replicator running"
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown requested");

    tokio::task::spawn_blocking(move || replication.shutdown())
        .await
        .context("replication shutdown task failed")?;
    Ok(())
}
