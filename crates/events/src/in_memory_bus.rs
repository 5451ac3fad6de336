//! In-memory event bus for tests/dev.

use std::collections::HashMap;
use std::sync::{Mutex, mpsc};

use thiserror::Error;

use crate::bus::{Delivery, EventBus, KeyedMessage, Subscription, SubscriptionSpec};

#[derive(Debug, Error)]
pub enum InMemoryBusError {
    /// Internal lock poisoning.
    #[error("in-memory bus lock poisoned")]
    Poisoned,

    /// A receipt that this bus never handed out.
    #[error("unknown delivery receipt: {0}")]
    UnknownReceipt(String),
}

/// A delivery routed out of the main processing path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    pub topic: String,
    pub partition: u32,
    pub group: String,
    pub key: String,
    pub payload: String,
    pub reason: String,
}

type PartitionKey = (String, u32);
type GroupKey = (String, u32, String);

#[derive(Debug, Default)]
struct State {
    /// Append-only log per `(topic, partition)`.
    logs: HashMap<PartitionKey, Vec<KeyedMessage>>,
    /// Next offset to deliver after a restart, per `(topic, partition, group)`.
    committed: HashMap<GroupKey, usize>,
    /// Live subscriber per `(topic, partition, group)`.
    subscribers: HashMap<GroupKey, mpsc::Sender<Delivery>>,
    dead_letters: Vec<DeadLetter>,
}

/// In-memory partitioned log with consumer-group offsets.
///
/// - No IO / no async
/// - Retains every message, so a group that subscribes late starts from the
///   beginning of the partition
/// - A new subscription for a group/partition replays everything after the
///   group's last acknowledged offset (redelivery after a crash)
#[derive(Debug, Default)]
pub struct InMemoryEventBus {
    state: Mutex<State>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything published to `topic`, across partitions, in partition order.
    pub fn published(&self, topic: &str) -> Vec<KeyedMessage> {
        let Ok(state) = self.state.lock() else {
            return Vec::new();
        };
        let mut partitions: Vec<_> = state
            .logs
            .iter()
            .filter(|((t, _), _)| t == topic)
            .collect();
        partitions.sort_by_key(|((_, p), _)| *p);
        partitions
            .into_iter()
            .flat_map(|(_, log)| log.iter().cloned())
            .collect()
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.state
            .lock()
            .map(|s| s.dead_letters.clone())
            .unwrap_or_default()
    }

    /// Offset the group will resume from on its next subscription.
    pub fn committed_offset(&self, spec: &SubscriptionSpec) -> usize {
        self.state
            .lock()
            .ok()
            .and_then(|s| s.committed.get(&group_key(spec)).copied())
            .unwrap_or(0)
    }
}

fn group_key(spec: &SubscriptionSpec) -> GroupKey {
    (
        spec.topic.clone(),
        spec.partition,
        spec.group.as_str().to_string(),
    )
}

fn parse_receipt(delivery: &Delivery) -> Result<usize, InMemoryBusError> {
    delivery
        .receipt
        .parse()
        .map_err(|_| InMemoryBusError::UnknownReceipt(delivery.receipt.clone()))
}

impl EventBus for InMemoryEventBus {
    type Error = InMemoryBusError;

    fn publish(&self, message: KeyedMessage) -> Result<(), Self::Error> {
        let mut state = self.state.lock().map_err(|_| InMemoryBusError::Poisoned)?;
        let State {
            logs, subscribers, ..
        } = &mut *state;

        let log = logs
            .entry((message.topic.clone(), message.partition))
            .or_default();
        let offset = log.len();
        log.push(message.clone());

        // Fan out to every group reading this partition; drop dead subscribers.
        subscribers.retain(|(topic, partition, _), tx| {
            if *topic != message.topic || *partition != message.partition {
                return true;
            }
            tx.send(Delivery {
                message: message.clone(),
                receipt: offset.to_string(),
            })
            .is_ok()
        });

        Ok(())
    }

    fn subscribe(&self, spec: &SubscriptionSpec) -> Result<Subscription<Delivery>, Self::Error> {
        let mut state = self.state.lock().map_err(|_| InMemoryBusError::Poisoned)?;
        let (tx, rx) = mpsc::channel();

        let key = group_key(spec);
        let from = state.committed.get(&key).copied().unwrap_or(0);
        if let Some(log) = state.logs.get(&(spec.topic.clone(), spec.partition)) {
            for (offset, message) in log.iter().enumerate().skip(from) {
                // Receiver is alive: we hold it.
                let _ = tx.send(Delivery {
                    message: message.clone(),
                    receipt: offset.to_string(),
                });
            }
        }

        // Replaces (and thereby disconnects) any previous subscriber of this
        // group/partition.
        state.subscribers.insert(key, tx);
        Ok(Subscription::new(rx))
    }

    fn acknowledge(&self, spec: &SubscriptionSpec, delivery: &Delivery) -> Result<(), Self::Error> {
        let offset = parse_receipt(delivery)?;
        let mut state = self.state.lock().map_err(|_| InMemoryBusError::Poisoned)?;
        let committed = state.committed.entry(group_key(spec)).or_insert(0);
        *committed = (*committed).max(offset + 1);
        Ok(())
    }

    fn dead_letter(
        &self,
        spec: &SubscriptionSpec,
        delivery: &Delivery,
        reason: &str,
    ) -> Result<(), Self::Error> {
        let mut state = self.state.lock().map_err(|_| InMemoryBusError::Poisoned)?;
        state.dead_letters.push(DeadLetter {
            topic: spec.topic.clone(),
            partition: spec.partition,
            group: spec.group.as_str().to_string(),
            key: delivery.message.key.clone(),
            payload: delivery.message.payload.clone(),
            reason: reason.to_string(),
        });
        Ok(())
    }
}
