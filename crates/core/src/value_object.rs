//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// A value object has no identity of its own; two instances with the same
/// attributes are interchangeable. Snapshots carried inside change events are
/// built from value objects (e.g. a postal address), so they can be copied onto
/// a replica without any identity bookkeeping.
///
/// ```ignore
/// #[derive(Debug, Clone, PartialEq, Eq)]
/// struct Address { street: String, city: String }
///
/// impl ValueObject for Address {}
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
