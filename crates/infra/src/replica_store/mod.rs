//! Replica Store: local tables of foreign-owned entity snapshots.
//!
//! The consumer is the only writer; the order service only reads. Each
//! [`ReplicaStore::apply`] call is its own transaction.

use std::sync::Arc;

use storefront_orders::{Replica, Replicated};

use crate::error::StoreError;

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryReplicaStore;
pub use postgres::{PgReplicaTable, PostgresReplicaStore};

/// One event's worth of change to a replica table.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplicaChange<R: Replica> {
    /// Insert when absent, overwrite every field when present.
    Upsert(R),
    /// Remove if present; absent is a no-op.
    Delete(R::Id),
}

/// What [`ReplicaStore::apply`] actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicaWrite {
    Inserted,
    Updated,
    Deleted,
    /// Delete of an identity that was never (or is no longer) replicated.
    Absent,
}

impl ReplicaWrite {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplicaWrite::Inserted => "inserted",
            ReplicaWrite::Updated => "updated",
            ReplicaWrite::Deleted => "deleted",
            ReplicaWrite::Absent => "absent",
        }
    }
}

pub trait ReplicaStore<R: Replica>: Send + Sync {
    fn find(&self, id: R::Id) -> Result<Option<Replicated<R>>, StoreError>;

    /// Plain (non-locking) existence check.
    fn exists(&self, id: R::Id) -> Result<bool, StoreError> {
        Ok(self.find(id)?.is_some())
    }

    /// All rows, ordered by identity.
    fn list(&self) -> Result<Vec<Replicated<R>>, StoreError>;

    /// Look up by identity and insert, overwrite or delete, atomically.
    fn apply(&self, change: ReplicaChange<R>) -> Result<ReplicaWrite, StoreError>;
}

impl<R, S> ReplicaStore<R> for Arc<S>
where
    R: Replica,
    S: ReplicaStore<R> + ?Sized,
{
    fn find(&self, id: R::Id) -> Result<Option<Replicated<R>>, StoreError> {
        (**self).find(id)
    }

    fn exists(&self, id: R::Id) -> Result<bool, StoreError> {
        (**self).exists(id)
    }

    fn list(&self) -> Result<Vec<Replicated<R>>, StoreError> {
        (**self).list()
    }

    fn apply(&self, change: ReplicaChange<R>) -> Result<ReplicaWrite, StoreError> {
        (**self).apply(change)
    }
}
