//! Infrastructure event bus implementations.
//!
//! The bus contract and the in-memory bus live in `storefront-events` as pure
//! mechanics. This module provides the Redis-backed transport.

#[cfg(feature = "redis")]
pub mod redis_streams;

#[cfg(feature = "redis")]
pub use redis_streams::{RedisStreamsError, RedisStreamsEventBus};
