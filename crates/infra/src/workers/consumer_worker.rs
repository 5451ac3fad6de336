use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tracing::{debug, error, warn};

use storefront_events::{Delivery, EventBus, KeyedMessage, Subscription, SubscriptionSpec};

use crate::reconciler::ReconcileError;

/// In-place retry policy for persistence failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Handler runs per delivery, first attempt included.
    pub max_attempts: u32,
    /// Wait before attempt `n + 1` is `backoff * n`.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(200),
        }
    }
}

/// Handle to control and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    name: String,
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Request graceful shutdown and wait for the worker to stop.
    ///
    /// A delivery being retried when the signal arrives is left
    /// unacknowledged and is redelivered to the next subscriber.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// What the worker did with one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Outcome {
    Applied,
    Discarded,
    DeadLettered,
    /// Shutdown requested mid-retry; delivery stays pending.
    Interrupted,
}

/// Consumer loop for one partition of one topic.
///
/// - Exactly one worker per (group, partition), so a key is never processed
///   concurrently and is processed in append order
/// - A delivery is acknowledged only once it is finished with: applied,
///   discarded or dead-lettered
/// - Poison payloads are dead-lettered, never retried
/// - Store failures are retried in place, then dead-lettered so the
///   partition keeps moving
#[derive(Debug)]
pub struct ConsumerWorker;

impl ConsumerWorker {
    /// Subscribe and spawn a worker thread for `spec`.
    pub fn spawn<B, H>(
        bus: B,
        spec: SubscriptionSpec,
        policy: RetryPolicy,
        mut handler: H,
    ) -> Result<WorkerHandle, B::Error>
    where
        B: EventBus + 'static,
        H: FnMut(&KeyedMessage) -> Result<(), ReconcileError> + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let sub = bus.subscribe(&spec)?;
        let name = spec.consumer_name();

        let join = thread::Builder::new()
            .name(name.clone())
            .spawn(move || worker_loop(&bus, &spec, sub, shutdown_rx, policy, &mut handler))
            .expect("failed to spawn consumer worker thread");

        Ok(WorkerHandle {
            name,
            shutdown: shutdown_tx,
            join: Some(join),
        })
    }
}

fn worker_loop<B, H>(
    bus: &B,
    spec: &SubscriptionSpec,
    sub: Subscription<Delivery>,
    shutdown_rx: mpsc::Receiver<()>,
    policy: RetryPolicy,
    handler: &mut H,
) where
    B: EventBus,
    H: FnMut(&KeyedMessage) -> Result<(), ReconcileError>,
{
    let tick = Duration::from_millis(250);

    loop {
        // Shutdown check (non-blocking)
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        match sub.recv_timeout(tick) {
            Ok(delivery) => {
                let outcome = process(bus, spec, &delivery, &shutdown_rx, policy, handler);
                if outcome == Outcome::Interrupted {
                    break;
                }
                if let Err(err) = bus.acknowledge(spec, &delivery) {
                    warn!(
                        group = %spec.group,
                        partition = spec.partition,
                        receipt = %delivery.receipt,
                        error = %err,
                        "failed to acknowledge delivery"
                    );
                }
                debug!(
                    group = %spec.group,
                    partition = spec.partition,
                    key = %delivery.message.key,
                    outcome = ?outcome,
                    "delivery finished"
                );
            }
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
}

fn process<B, H>(
    bus: &B,
    spec: &SubscriptionSpec,
    delivery: &Delivery,
    shutdown_rx: &mpsc::Receiver<()>,
    policy: RetryPolicy,
    handler: &mut H,
) -> Outcome
where
    B: EventBus,
    H: FnMut(&KeyedMessage) -> Result<(), ReconcileError>,
{
    let mut attempt = 1;

    loop {
        match handler(&delivery.message) {
            Ok(()) => return Outcome::Applied,
            Err(ReconcileError::Rejected(rejection)) if rejection.is_poison() => {
                dead_letter(bus, spec, delivery, &rejection.to_string());
                return Outcome::DeadLettered;
            }
            // Already logged by the reconciler.
            Err(ReconcileError::Rejected(_)) => return Outcome::Discarded,
            Err(ReconcileError::Store(err)) if attempt >= policy.max_attempts => {
                error!(
                    group = %spec.group,
                    partition = spec.partition,
                    key = %delivery.message.key,
                    attempts = attempt,
                    error = %err,
                    "replica persistence failed; retries exhausted"
                );
                dead_letter(bus, spec, delivery, &format!("retries exhausted: {err}"));
                return Outcome::DeadLettered;
            }
            Err(ReconcileError::Store(err)) => {
                warn!(
                    group = %spec.group,
                    partition = spec.partition,
                    key = %delivery.message.key,
                    attempt,
                    error = %err,
                    "replica persistence failed; retrying"
                );
                // The backoff wait doubles as the shutdown check.
                match shutdown_rx.recv_timeout(policy.backoff * attempt) {
                    Ok(()) => return Outcome::Interrupted,
                    Err(mpsc::RecvTimeoutError::Timeout) => {}
                    Err(mpsc::RecvTimeoutError::Disconnected) => return Outcome::Interrupted,
                }
                attempt += 1;
            }
        }
    }
}

fn dead_letter<B: EventBus>(bus: &B, spec: &SubscriptionSpec, delivery: &Delivery, reason: &str) {
    match bus.dead_letter(spec, delivery, reason) {
        Ok(()) => warn!(
            topic = %spec.topic,
            group = %spec.group,
            partition = spec.partition,
            key = %delivery.message.key,
            reason,
            "delivery routed to dead letter"
        ),
        // Still acknowledged afterwards: a broken dead-letter path must not wedge the partition.
        Err(err) => error!(
            topic = %spec.topic,
            group = %spec.group,
            key = %delivery.message.key,
            reason,
            error = %err,
            "failed to dead-letter delivery; dropping it"
        ),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Instant;

    use storefront_events::{
        ConsumerGroup, EntityType, InMemoryEventBus, Rejection,
    };

    use super::*;
    use crate::error::StoreError;

    fn spec() -> SubscriptionSpec {
        SubscriptionSpec::new(
            "product-events",
            ConsumerGroup::new("order-service", EntityType::Product),
            0,
        )
    }

    fn message(key: &str, payload: &str) -> KeyedMessage {
        KeyedMessage {
            topic: "product-events".to_string(),
            partition: 0,
            key: key.to_string(),
            payload: payload.to_string(),
        }
    }

    fn fast() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            backoff: Duration::from_millis(1),
        }
    }

    fn wait_until(mut done: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !done() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn handles_in_order_and_acknowledges() {
        let bus = Arc::new(InMemoryEventBus::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_by_worker = seen.clone();

        let worker = ConsumerWorker::spawn(bus.clone(), spec(), fast(), move |m| {
            seen_by_worker.lock().unwrap().push(m.payload.clone());
            Ok(())
        })
        .unwrap();

        for payload in ["a", "b", "c"] {
            bus.publish(message("7", payload)).unwrap();
        }
        wait_until(|| bus.committed_offset(&spec()) == 3);
        worker.shutdown();

        assert_eq!(*seen.lock().unwrap(), vec!["a", "b", "c"]);
        assert_eq!(bus.committed_offset(&spec()), 3);
        assert!(bus.dead_letters().is_empty());
    }

    #[test]
    fn poison_message_is_dead_lettered_without_retry() {
        let bus = Arc::new(InMemoryEventBus::new());
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let worker = ConsumerWorker::spawn(bus.clone(), spec(), fast(), move |m| {
            counter.fetch_add(1, Ordering::SeqCst);
            if m.payload == "garbage" {
                Err(Rejection::Malformed("expected value".to_string()).into())
            } else {
                Ok(())
            }
        })
        .unwrap();

        bus.publish(message("7", "garbage")).unwrap();
        bus.publish(message("7", "fine")).unwrap();
        wait_until(|| bus.committed_offset(&spec()) == 2);
        worker.shutdown();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let dead = bus.dead_letters();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].payload, "garbage");
        assert!(dead[0].reason.contains("malformed"));
    }

    #[test]
    fn missing_identity_is_discarded_not_dead_lettered() {
        let bus = Arc::new(InMemoryEventBus::new());
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let worker = ConsumerWorker::spawn(bus.clone(), spec(), fast(), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(Rejection::MissingIdentity.into())
        })
        .unwrap();

        bus.publish(message("", "{}")).unwrap();
        wait_until(|| bus.committed_offset(&spec()) == 1);
        worker.shutdown();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(bus.committed_offset(&spec()), 1);
        assert!(bus.dead_letters().is_empty());
    }

    #[test]
    fn transient_store_failure_is_retried_in_place() {
        let bus = Arc::new(InMemoryEventBus::new());
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let worker = ConsumerWorker::spawn(bus.clone(), spec(), fast(), move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(StoreError::Backend("connection reset".to_string()).into())
            } else {
                Ok(())
            }
        })
        .unwrap();

        bus.publish(message("7", "a")).unwrap();
        wait_until(|| bus.committed_offset(&spec()) == 1);
        worker.shutdown();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(bus.dead_letters().is_empty());
    }

    #[test]
    fn exhausted_retries_dead_letter_and_move_on() {
        let bus = Arc::new(InMemoryEventBus::new());
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let worker = ConsumerWorker::spawn(bus.clone(), spec(), fast(), move |m| {
            counter.fetch_add(1, Ordering::SeqCst);
            if m.key == "7" {
                Err(StoreError::Backend("disk full".to_string()).into())
            } else {
                Ok(())
            }
        })
        .unwrap();

        bus.publish(message("7", "stuck")).unwrap();
        bus.publish(message("8", "next")).unwrap();
        wait_until(|| bus.committed_offset(&spec()) == 2);
        worker.shutdown();

        // Three attempts for "stuck", one for "next".
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        let dead = bus.dead_letters();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].key, "7");
        assert!(dead[0].reason.starts_with("retries exhausted"));
    }

    #[test]
    fn shutdown_during_retry_leaves_delivery_pending() {
        let bus = Arc::new(InMemoryEventBus::new());
        let slow = RetryPolicy {
            max_attempts: 10,
            backoff: Duration::from_secs(5),
        };
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let worker = ConsumerWorker::spawn(bus.clone(), spec(), slow, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Backend("down".to_string()).into())
        })
        .unwrap();

        bus.publish(message("7", "a")).unwrap();
        wait_until(|| calls.load(Ordering::SeqCst) >= 1);
        worker.shutdown();

        assert_eq!(bus.committed_offset(&spec()), 0);
        assert!(bus.dead_letters().is_empty());
    }
}
