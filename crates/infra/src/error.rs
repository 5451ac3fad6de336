//! Persistence error shared by every store in this crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing database rejected or failed the operation.
    #[error("store backend error: {0}")]
    Backend(String),

    /// A stored row could not be mapped back into a domain value.
    #[error("failed to decode stored row: {0}")]
    Decode(String),

    /// A write violated a constraint of the stored data (e.g. quantity < 1).
    #[error("store constraint violated: {0}")]
    Constraint(String),

    /// In-memory store lock poisoning.
    #[error("store lock poisoned")]
    Poisoned,
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::ColumnNotFound(_) => {
                StoreError::Decode(err.to_string())
            }
            sqlx::Error::Database(ref db) if db.constraint().is_some() => {
                StoreError::Constraint(db.message().to_string())
            }
            other => StoreError::Backend(other.to_string()),
        }
    }
}
