//! Producer: publishes a change event after the owning service committed.
//!
//! Publication is fire-and-forget from the caller's point of view. A failed
//! send is logged and dropped; the committed mutation is never rolled back
//! (at-most-once, no outbox).

use thiserror::Error;
use tracing::{info, warn};

use storefront_events::{ChangeEvent, ChangeKind, EventBus, KeyedMessage, Route, Snapshot, TopicRouter};

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to encode change event: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("transport rejected change event: {0}")]
    Transport(String),
}

/// Builds keyed messages from committed snapshots and hands them to the bus.
#[derive(Debug, Clone)]
pub struct ChangeProducer<B> {
    bus: B,
    router: TopicRouter,
}

impl<B: EventBus> ChangeProducer<B> {
    pub fn new(bus: B, router: TopicRouter) -> Self {
        Self { bus, router }
    }

    pub fn router(&self) -> &TopicRouter {
        &self.router
    }

    /// Publish and report the outcome.
    ///
    /// Key = string-encoded entity identity, topic = the entity type's topic,
    /// partition = hash of the key.
    pub fn try_publish<S: Snapshot>(&self, event: &ChangeEvent<S>) -> Result<Route, PublishError> {
        let key = event.key();
        let route = self.router.route(S::ENTITY, &key);
        let payload = event.to_json()?;

        self.bus
            .publish(KeyedMessage {
                topic: route.topic.clone(),
                partition: route.partition,
                key,
                payload,
            })
            .map_err(|e| PublishError::Transport(e.to_string()))?;

        Ok(route)
    }

    /// Publish a committed entity state. Never fails the caller.
    ///
    /// For `Deleted`, `committed` must be the state immediately before removal.
    pub fn publish<S: Snapshot>(&self, kind: ChangeKind, committed: S) {
        let event = ChangeEvent::new(kind, committed);
        let key = event.key();

        match self.try_publish(&event) {
            Ok(route) => info!(
                topic = %route.topic,
                partition = route.partition,
                key = %key,
                event_type = %kind,
                "change event published"
            ),
            Err(err) => warn!(
                entity = %S::ENTITY,
                key = %key,
                event_type = %kind,
                error = %err,
                "change event not published; committed state is kept"
            ),
        }
    }
}
