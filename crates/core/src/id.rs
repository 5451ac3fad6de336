//! Strongly-typed identifiers used across the services.
//!
//! Every entity in the system is identified by a positive 64-bit integer
//! assigned by the service that owns it. Replicas reuse the owner's value
//! verbatim, so the same newtype is shared by the owner and its replicas.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Common behaviour of the integer identity newtypes.
///
/// Consumers are generic over this so a single reconciler can fold events for
/// any replicated entity type.
pub trait EntityId:
    Copy
    + Eq
    + Ord
    + core::hash::Hash
    + core::fmt::Debug
    + core::fmt::Display
    + Send
    + Sync
    + 'static
{
    fn from_i64(value: i64) -> Self;

    fn as_i64(&self) -> i64;

    /// String form used as the message (partition) key.
    fn to_key(&self) -> String {
        self.as_i64().to_string()
    }
}

/// Identifier of a customer (owned by the customer service).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerId(i64);

/// Identifier of a product (owned by the product service).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(i64);

/// Identifier of an order (owned by the order service).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(i64);

/// Identifier of an order line item (owned by the order service).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderItemId(i64);

macro_rules! impl_i64_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            pub const fn get(&self) -> i64 {
                self.0
            }
        }

        impl EntityId for $t {
            fn from_i64(value: i64) -> Self {
                Self(value)
            }

            fn as_i64(&self) -> i64 {
                self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<i64> for $t {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl From<$t> for i64 {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let value = s
                    .trim()
                    .parse::<i64>()
                    .map_err(|e| DomainError::invalid_id(format!("{}: {}", $name, e)))?;
                Ok(Self(value))
            }
        }
    };
}

impl_i64_newtype!(CustomerId, "CustomerId");
impl_i64_newtype!(ProductId, "ProductId");
impl_i64_newtype!(OrderId, "OrderId");
impl_i64_newtype!(OrderItemId, "OrderItemId");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_the_decimal_identity() {
        assert_eq!(CustomerId::new(42).to_key(), "42");
        assert_eq!(ProductId::from_i64(7).to_key(), "7");
    }

    #[test]
    fn parses_from_key() {
        let id: OrderId = "5".parse().unwrap();
        assert_eq!(id, OrderId::new(5));
    }

    #[test]
    fn rejects_non_numeric_key() {
        let err = "abc".parse::<ProductId>().unwrap_err();
        assert!(matches!(err, DomainError::InvalidId(msg) if msg.starts_with("ProductId")));
    }

    #[test]
    fn serializes_transparently() {
        let json = serde_json::to_string(&CustomerId::new(42)).unwrap();
        assert_eq!(json, "42");
        let back: CustomerId = serde_json::from_str(&json).unwrap();
        assert_eq!(back.get(), 42);
    }
}
