//! Replica Reconciler: folds change events into a replica table.
//!
//! One event at a time, each in its own store transaction. The event's
//! identity selects the row; CREATED and UPDATED are both upserts.

use std::marker::PhantomData;

use thiserror::Error;
use tracing::{info, warn};

use storefront_events::{ChangeEvent, Rejection, Snapshot};
use storefront_orders::Replica;

use crate::error::StoreError;
use crate::replica_store::{ReplicaChange, ReplicaStore, ReplicaWrite};

#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The payload can never be applied (see [`Rejection::is_poison`]).
    #[error("event rejected: {0}")]
    Rejected(#[from] Rejection),

    /// Persistence failed for this event only; it may succeed on retry.
    #[error("replica store failure: {0}")]
    Store(#[from] StoreError),
}

pub struct ReplicaReconciler<R, S> {
    store: S,
    _replica: PhantomData<fn() -> R>,
}

impl<R, S> ReplicaReconciler<R, S>
where
    R: Replica,
    S: ReplicaStore<R>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            _replica: PhantomData,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Decode one wire payload and apply it.
    pub fn handle(&self, payload: &str) -> Result<ReplicaWrite, ReconcileError> {
        let event = ChangeEvent::<R::Snapshot>::from_json(payload).inspect_err(|rejection| {
            if !rejection.is_poison() {
                warn!(
                    entity = %<R::Snapshot as Snapshot>::ENTITY,
                    reason = %rejection,
                    "discarding change event"
                );
            }
        })?;
        Ok(self.apply(event)?)
    }

    /// Apply an already-decoded event.
    pub fn apply(&self, event: ChangeEvent<R::Snapshot>) -> Result<ReplicaWrite, StoreError> {
        let entity = <R::Snapshot as Snapshot>::ENTITY;
        let kind = event.kind();
        let id = event.entity_id();

        let change = match event {
            ChangeEvent::Created(snapshot) | ChangeEvent::Updated(snapshot) => {
                ReplicaChange::Upsert(R::from_snapshot(snapshot))
            }
            ChangeEvent::Deleted { id, .. } => ReplicaChange::Delete(id),
        };

        let outcome = self.store.apply(change)?;
        info!(
            entity = %entity,
            entity_id = %id,
            event_type = %kind,
            outcome = outcome.as_str(),
            "replica reconciled"
        );
        Ok(outcome)
    }
}
