//! Products domain module (owned by the product service).
//!
//! Pure domain logic (no IO, no HTTP, no storage).

pub mod product;

pub use product::{Product, ProductDraft};
