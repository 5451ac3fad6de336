//! Keyed publish/subscribe abstraction (mechanics only).
//!
//! The bus moves opaque, already-encoded change events between an owning
//! service and its dependents. It knows nothing about entity types beyond the
//! topic name and the partition key.
//!
//! ## Delivery contract
//!
//! - **Per-key order**: messages with the same key land on the same
//!   `(topic, partition)` and are delivered to a consumer group in append order.
//! - **At-least-once for consumers**: a delivery stays pending for its group
//!   until [`EventBus::acknowledge`] is called, and is redelivered to the next
//!   subscription of that group/partition if the consumer stops before that.
//! - **At-most-once for producers**: a failed `publish` is reported to the
//!   caller and not retried by the bus.
//! - **Independent groups**: each consumer group tracks its own position.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::Duration;

use crate::topic::ConsumerGroup;

/// An encoded change event addressed to one partition of one topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyedMessage {
    pub topic: String,
    pub partition: u32,
    /// String-encoded entity identity.
    pub key: String,
    /// JSON wire record.
    pub payload: String,
}

/// A message handed to a consumer, plus the transport's handle for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub message: KeyedMessage,
    /// Opaque receipt passed back on acknowledge/dead-letter
    /// (stream entry id, log offset, ...).
    pub receipt: String,
}

/// What one consumer worker reads: one partition of one topic, as a member of
/// one consumer group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionSpec {
    pub topic: String,
    pub group: ConsumerGroup,
    pub partition: u32,
}

impl SubscriptionSpec {
    pub fn new(topic: impl Into<String>, group: ConsumerGroup, partition: u32) -> Self {
        Self {
            topic: topic.into(),
            group,
            partition,
        }
    }

    /// Consumer name within the group. One consumer per partition.
    pub fn consumer_name(&self) -> String {
        format!("{}-{}", self.group, self.partition)
    }
}

/// A subscription to one partition.
///
/// Designed for single-threaded consumption: one worker owns one
/// subscription. Dropping it tells any background reader feeding the
/// channel to stop.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
    closed: Option<Arc<AtomicBool>>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self {
            receiver,
            closed: None,
        }
    }

    /// Subscription fed by a background reader that polls `closed`.
    pub fn with_close_flag(receiver: Receiver<M>, closed: Arc<AtomicBool>) -> Self {
        Self {
            receiver,
            closed: Some(closed),
        }
    }

    /// Block until the next message is available.
    pub fn recv(&self) -> Result<M, std::sync::mpsc::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a message without blocking.
    pub fn try_recv(&self) -> Result<M, std::sync::mpsc::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block for up to `timeout` waiting for a message.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, std::sync::mpsc::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

impl<M> Drop for Subscription<M> {
    fn drop(&mut self) {
        if let Some(closed) = &self.closed {
            closed.store(true, Ordering::SeqCst);
        }
    }
}

/// Transport for keyed change events.
///
/// Implementations must be safe to share across threads: producers publish
/// from request handlers while consumer workers read on their own threads.
pub trait EventBus: Send + Sync {
    type Error: core::fmt::Debug + core::fmt::Display + Send + Sync + 'static;

    /// Append a message to its `(topic, partition)`.
    fn publish(&self, message: KeyedMessage) -> Result<(), Self::Error>;

    /// Start reading one partition as a member of a consumer group.
    ///
    /// Unacknowledged deliveries of that group/partition are delivered first.
    fn subscribe(&self, spec: &SubscriptionSpec) -> Result<Subscription<Delivery>, Self::Error>;

    /// Mark a delivery as done for the subscription's group.
    fn acknowledge(&self, spec: &SubscriptionSpec, delivery: &Delivery) -> Result<(), Self::Error>;

    /// Route a delivery out of the main path. Does not acknowledge it.
    fn dead_letter(
        &self,
        spec: &SubscriptionSpec,
        delivery: &Delivery,
        reason: &str,
    ) -> Result<(), Self::Error>;
}

impl<B> EventBus for Arc<B>
where
    B: EventBus + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: KeyedMessage) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self, spec: &SubscriptionSpec) -> Result<Subscription<Delivery>, Self::Error> {
        (**self).subscribe(spec)
    }

    fn acknowledge(&self, spec: &SubscriptionSpec, delivery: &Delivery) -> Result<(), Self::Error> {
        (**self).acknowledge(spec, delivery)
    }

    fn dead_letter(
        &self,
        spec: &SubscriptionSpec,
        delivery: &Delivery,
        reason: &str,
    ) -> Result<(), Self::Error> {
        (**self).dead_letter(spec, delivery, reason)
    }
}
