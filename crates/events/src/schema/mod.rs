//! Versionless per-entity change event schema.
//!
//! Each owning service publishes one record shape per entity type: the change
//! kind (`eventType`) plus a full snapshot of the entity's mutable fields,
//! flattened into a single JSON object:
//!
//! ```text
//! {"eventType":"CREATED","customerId":42,"name":"Acme","email":"a@x.com", ...}
//! ```

mod change;
mod customer;
mod product;

pub use change::{ChangeEvent, ChangeKind, Rejection, Snapshot};
pub use customer::{Address, CustomerSnapshot};
pub use product::ProductSnapshot;
