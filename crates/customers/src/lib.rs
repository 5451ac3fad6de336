//! Customers domain module (owned by the customer service).
//!
//! Pure domain logic: validation of incoming drafts and conversion of the
//! persisted entity into the snapshot published on every change. No IO.

pub mod customer;

pub use customer::{Customer, CustomerDraft};
pub use storefront_events::Address;
