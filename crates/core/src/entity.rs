//! Entity trait: identity + continuity across state changes.

use crate::id::EntityId;

/// Entity marker + minimal interface.
///
/// Both owned entities (customers, products, orders) and replicas implement
/// this. For a replica the identity is never generated locally; it is copied
/// from the change event of the owning service.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: EntityId;

    /// Returns the entity identifier.
    fn id(&self) -> Self::Id;
}
