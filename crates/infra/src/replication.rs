//! Wiring of the consumer side: one worker per partition per replicated
//! entity type, each folding into its replica store.

use std::sync::Arc;

use tracing::info;

use storefront_events::{EntityType, EventBus, Snapshot, SubscriptionSpec};
use storefront_orders::{CustomerReplica, ProductReplica, Replica};

use crate::config::ReplicationConfig;
use crate::reconciler::ReplicaReconciler;
use crate::replica_store::ReplicaStore;
use crate::workers::{ConsumerWorker, RetryPolicy, WorkerHandle};

/// Running consumer workers of a dependent service.
#[derive(Debug)]
pub struct ReplicationHandle {
    partitions: u32,
    workers: Vec<WorkerHandle>,
}

impl ReplicationHandle {
    /// Partitions consumed per entity type, after clamping to at least one.
    pub fn partitions(&self) -> u32 {
        self.partitions
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn worker_names(&self) -> Vec<&str> {
        self.workers.iter().map(WorkerHandle::name).collect()
    }

    /// Stop every worker and wait for them. In-flight deliveries finish first.
    pub fn shutdown(self) {
        let count = self.workers.len();
        for worker in self.workers {
            worker.shutdown();
        }
        info!(workers = count, "replication stopped");
    }
}

pub struct Replication;

impl Replication {
    /// Subscribe to customer and product topics and start reconciling.
    ///
    /// If any subscription fails, the workers started so far are stopped.
    pub fn start<B, C, P>(
        config: &ReplicationConfig,
        bus: Arc<B>,
        customers: Arc<C>,
        products: Arc<P>,
    ) -> Result<ReplicationHandle, B::Error>
    where
        B: EventBus + 'static,
        C: ReplicaStore<CustomerReplica> + 'static,
        P: ReplicaStore<ProductReplica> + 'static,
    {
        let mut workers = Vec::new();
        let policy = config.retry_policy();

        let started = spawn_entity::<CustomerReplica, _, _>(config, &bus, &customers, policy, &mut workers)
            .and_then(|()| spawn_entity::<ProductReplica, _, _>(config, &bus, &products, policy, &mut workers));

        if let Err(err) = started {
            for worker in workers {
                worker.shutdown();
            }
            return Err(err);
        }

        let partitions = config.router().partitions();
        info!(
            service = %config.service_name,
            partitions,
            workers = workers.len(),
            "replication started"
        );
        Ok(ReplicationHandle { partitions, workers })
    }
}

fn spawn_entity<R, B, S>(
    config: &ReplicationConfig,
    bus: &Arc<B>,
    store: &Arc<S>,
    policy: RetryPolicy,
    workers: &mut Vec<WorkerHandle>,
) -> Result<(), B::Error>
where
    R: Replica,
    B: EventBus + 'static,
    S: ReplicaStore<R> + 'static,
{
    let entity: EntityType = <R::Snapshot as Snapshot>::ENTITY;
    let router = config.router();
    let topic = router.topic_for(entity).to_string();
    let group = config.group(entity);

    for partition in 0..router.partitions() {
        let spec = SubscriptionSpec::new(topic.clone(), group.clone(), partition);
        let reconciler = ReplicaReconciler::<R, _>::new(Arc::clone(store));
        let worker = ConsumerWorker::spawn(Arc::clone(bus), spec, policy, move |message| {
            reconciler.handle(&message.payload).map(|_| ())
        })?;
        workers.push(worker);
    }
    Ok(())
}
