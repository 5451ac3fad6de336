//! Orders domain module (owned by the order service).
//!
//! Order/OrderItem aggregate rows plus the local replicas of customers and
//! products the aggregate references. Pure domain logic, no IO.

pub mod order;
pub mod replica;

pub use order::{
    Order, OrderDraft, OrderItem, OrderLine, OrderStatus, REFERENCED_WARNING_KEY,
    ReferencedWarning,
};
pub use replica::{CustomerReplica, ProductReplica, Replica, Replicated};
