//! Owning-side CRUD services.
//!
//! Each service commits to its repository first and only then hands the
//! committed state to the [`ChangeProducer`](crate::producer::ChangeProducer).

pub mod customers;
pub mod products;

pub use customers::{
    CustomerRepository, CustomerService, CustomerServiceError, InMemoryCustomerRepository,
};
pub use products::{CatalogError, InMemoryProductRepository, ProductRepository, ProductService};
