use std::collections::BTreeMap;
use std::sync::RwLock;

use chrono::Utc;

use storefront_orders::{Replica, Replicated};

use super::{ReplicaChange, ReplicaStore, ReplicaWrite};
use crate::error::StoreError;

/// In-memory replica table for tests/dev.
///
/// The write lock is the transaction: lookup and write of one change happen
/// under the same guard.
#[derive(Debug)]
pub struct InMemoryReplicaStore<R: Replica> {
    rows: RwLock<BTreeMap<R::Id, Replicated<R>>>,
}

impl<R: Replica> InMemoryReplicaStore<R> {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.read().map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<R: Replica> Default for InMemoryReplicaStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Replica> ReplicaStore<R> for InMemoryReplicaStore<R> {
    fn find(&self, id: R::Id) -> Result<Option<Replicated<R>>, StoreError> {
        let rows = self.rows.read().map_err(|_| StoreError::Poisoned)?;
        Ok(rows.get(&id).cloned())
    }

    fn list(&self) -> Result<Vec<Replicated<R>>, StoreError> {
        let rows = self.rows.read().map_err(|_| StoreError::Poisoned)?;
        Ok(rows.values().cloned().collect())
    }

    fn apply(&self, change: ReplicaChange<R>) -> Result<ReplicaWrite, StoreError> {
        let mut rows = self.rows.write().map_err(|_| StoreError::Poisoned)?;
        let now = Utc::now();

        match change {
            ReplicaChange::Upsert(row) => match rows.get_mut(&row.id()) {
                Some(existing) => {
                    existing.overwrite(row, now);
                    Ok(ReplicaWrite::Updated)
                }
                None => {
                    rows.insert(row.id(), Replicated::new(row, now));
                    Ok(ReplicaWrite::Inserted)
                }
            },
            ReplicaChange::Delete(id) => Ok(match rows.remove(&id) {
                Some(_) => ReplicaWrite::Deleted,
                None => ReplicaWrite::Absent,
            }),
        }
    }
}
