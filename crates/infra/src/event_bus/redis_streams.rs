//! Redis Streams-backed event bus (durable, at-least-once delivery).
//!
//! ## Layout
//!
//! - **Stream key**: `<prefix>:<topic>:<partition>`, one stream per partition
//! - **Consumer groups**: one per (service, entity type), e.g. `order-service-customer`
//! - **Consumers**: one per (group, partition), named `<group>-<partition>`
//! - **Dead-letter stream**: `<prefix>:<topic>:dlq`
//!
//! A subscription first re-reads the consumer's own pending entries (id `0`),
//! then switches to new entries (`>`). Entries stay pending until the worker
//! calls [`EventBus::acknowledge`], so anything unacknowledged at a crash is
//! redelivered, in stream order, to the next subscriber with the same name.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, SyncSender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use redis::Value;
use tracing::{debug, instrument, warn};

use storefront_events::{Delivery, EventBus, KeyedMessage, Subscription, SubscriptionSpec};

/// Entries fetched per XREADGROUP call; also the channel bound.
const DEFAULT_BATCH: usize = 16;

/// How long a read for new entries blocks server-side.
const DEFAULT_BLOCK_MS: u64 = 1_000;

const RECONNECT_DELAY: Duration = Duration::from_millis(500);

const KEY_FIELD: &str = "key";
const PAYLOAD_FIELD: &str = "payload";

#[derive(Debug, Clone)]
pub struct RedisStreamsEventBus {
    client: Arc<redis::Client>,
    prefix: String,
    batch: usize,
    block_ms: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum RedisStreamsError {
    #[error("Redis connection error: {0}")]
    Connection(String),

    #[error("Redis command error: {0}")]
    Command(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Consumer group error: {0}")]
    ConsumerGroup(String),

    #[error("failed to start stream poller: {0}")]
    Poller(String),
}

impl RedisStreamsEventBus {
    /// Create a bus for `redis_url`. No connection is made until first use.
    pub fn new(redis_url: impl AsRef<str>, prefix: impl Into<String>) -> Result<Self, RedisStreamsError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| RedisStreamsError::Connection(e.to_string()))?;

        Ok(Self {
            client: Arc::new(client),
            prefix: prefix.into(),
            batch: DEFAULT_BATCH,
            block_ms: DEFAULT_BLOCK_MS,
        })
    }

    pub fn with_batch(mut self, batch: usize) -> Self {
        self.batch = batch.max(1);
        self
    }

    pub fn with_block_ms(mut self, block_ms: u64) -> Self {
        self.block_ms = block_ms;
        self
    }

    pub fn stream_key(&self, topic: &str, partition: u32) -> String {
        format!("{}:{topic}:{partition}", self.prefix)
    }

    pub fn dlq_key(&self, topic: &str) -> String {
        format!("{}:{topic}:dlq", self.prefix)
    }

    fn connection(&self) -> Result<redis::Connection, RedisStreamsError> {
        self.client
            .get_connection()
            .map_err(|e| RedisStreamsError::Connection(e.to_string()))
    }

    /// Ensure a consumer group exists on `stream` (idempotent).
    ///
    /// A new group starts at `0`, so a dependent service that subscribes late
    /// still sees every retained entry.
    pub fn ensure_consumer_group(&self, stream: &str, group: &str) -> Result<(), RedisStreamsError> {
        let mut conn = self.connection()?;
        let created: redis::RedisResult<Value> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(stream)
            .arg(group)
            .arg("0")
            .arg("MKSTREAM")
            .query(&mut conn);

        match created {
            Ok(_) => Ok(()),
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
            Err(e) => Err(RedisStreamsError::ConsumerGroup(format!(
                "XGROUP CREATE {stream} {group} failed: {e}"
            ))),
        }
    }
}

impl EventBus for RedisStreamsEventBus {
    type Error = RedisStreamsError;

    #[instrument(
        skip(self, message),
        fields(topic = %message.topic, partition = message.partition, key = %message.key),
        err
    )]
    fn publish(&self, message: KeyedMessage) -> Result<(), Self::Error> {
        let mut conn = self.connection()?;
        let _: String = redis::cmd("XADD")
            .arg(self.stream_key(&message.topic, message.partition))
            .arg("*")
            .arg(KEY_FIELD)
            .arg(&message.key)
            .arg(PAYLOAD_FIELD)
            .arg(&message.payload)
            .query(&mut conn)
            .map_err(|e| RedisStreamsError::Command(format!("XADD failed: {e}")))?;
        Ok(())
    }

    fn subscribe(&self, spec: &SubscriptionSpec) -> Result<Subscription<Delivery>, Self::Error> {
        let stream = self.stream_key(&spec.topic, spec.partition);
        self.ensure_consumer_group(&stream, spec.group.as_str())?;

        let (tx, rx) = mpsc::sync_channel(self.batch);
        let closed = Arc::new(AtomicBool::new(false));

        let poller = StreamPoller {
            client: Arc::clone(&self.client),
            topic: spec.topic.clone(),
            partition: spec.partition,
            stream,
            group: spec.group.as_str().to_string(),
            consumer: spec.consumer_name(),
            batch: self.batch,
            block_ms: self.block_ms,
            cursor: Cursor::Pending("0".to_string()),
        };

        let stop = Arc::clone(&closed);
        thread::Builder::new()
            .name(format!("{}-poller", spec.consumer_name()))
            .spawn(move || poller.run(tx, stop))
            .map_err(|e| RedisStreamsError::Poller(e.to_string()))?;

        Ok(Subscription::with_close_flag(rx, closed))
    }

    fn acknowledge(&self, spec: &SubscriptionSpec, delivery: &Delivery) -> Result<(), Self::Error> {
        let mut conn = self.connection()?;
        let _: u64 = redis::cmd("XACK")
            .arg(self.stream_key(&spec.topic, spec.partition))
            .arg(spec.group.as_str())
            .arg(&delivery.receipt)
            .query(&mut conn)
            .map_err(|e| RedisStreamsError::Command(format!("XACK failed: {e}")))?;
        Ok(())
    }

    fn dead_letter(
        &self,
        spec: &SubscriptionSpec,
        delivery: &Delivery,
        reason: &str,
    ) -> Result<(), Self::Error> {
        let mut conn = self.connection()?;
        let _: String = redis::cmd("XADD")
            .arg(self.dlq_key(&spec.topic))
            .arg("*")
            .arg("group")
            .arg(spec.group.as_str())
            .arg("partition")
            .arg(spec.partition.to_string())
            .arg("source_id")
            .arg(&delivery.receipt)
            .arg("reason")
            .arg(reason)
            .arg("failed_at")
            .arg(chrono::Utc::now().to_rfc3339())
            .arg(KEY_FIELD)
            .arg(&delivery.message.key)
            .arg(PAYLOAD_FIELD)
            .arg(&delivery.message.payload)
            .query(&mut conn)
            .map_err(|e| RedisStreamsError::Command(format!("DLQ XADD failed: {e}")))?;
        Ok(())
    }
}

/// Where the next XREADGROUP starts.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Cursor {
    /// Re-reading this consumer's pending entries after the given id.
    Pending(String),
    /// Reading entries never delivered to the group.
    New,
}

/// Stream entry as returned by XREADGROUP.
#[derive(Debug, Clone, PartialEq, Eq)]
struct StreamEntry {
    id: String,
    fields: HashMap<String, String>,
}

impl StreamEntry {
    /// Entries without a payload are still delivered; the consumer rejects
    /// them as malformed and dead-letters them.
    fn into_delivery(mut self, topic: &str, partition: u32) -> Delivery {
        Delivery {
            message: KeyedMessage {
                topic: topic.to_string(),
                partition,
                key: self.fields.remove(KEY_FIELD).unwrap_or_default(),
                payload: self.fields.remove(PAYLOAD_FIELD).unwrap_or_default(),
            },
            receipt: self.id,
        }
    }
}

/// Background reader behind one subscription.
struct StreamPoller {
    client: Arc<redis::Client>,
    topic: String,
    partition: u32,
    stream: String,
    group: String,
    consumer: String,
    batch: usize,
    block_ms: u64,
    cursor: Cursor,
}

impl StreamPoller {
    fn run(mut self, tx: SyncSender<Delivery>, closed: Arc<AtomicBool>) {
        let mut conn: Option<redis::Connection> = None;

        while !closed.load(Ordering::SeqCst) {
            if conn.is_none() {
                match self.client.get_connection() {
                    Ok(c) => conn = Some(c),
                    Err(e) => {
                        warn!(stream = %self.stream, error = %e, "redis connection failed; retrying");
                        thread::sleep(RECONNECT_DELAY);
                        continue;
                    }
                }
            }
            let Some(c) = conn.as_mut() else { continue };

            match self.read_batch(c) {
                Ok(entries) => {
                    for entry in entries {
                        if tx.send(entry.into_delivery(&self.topic, self.partition)).is_err() {
                            // Subscription dropped.
                            return;
                        }
                    }
                }
                Err(e) => {
                    // Cursor is kept: entries already handed over are not re-read.
                    warn!(stream = %self.stream, group = %self.group, error = %e, "stream read failed; reconnecting");
                    conn = None;
                    thread::sleep(RECONNECT_DELAY);
                }
            }
        }
        debug!(stream = %self.stream, consumer = %self.consumer, "stream poller stopped");
    }

    fn read_batch(&mut self, conn: &mut redis::Connection) -> Result<Vec<StreamEntry>, RedisStreamsError> {
        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP")
            .arg(&self.group)
            .arg(&self.consumer)
            .arg("COUNT")
            .arg(self.batch);

        let start = match &self.cursor {
            Cursor::Pending(last) => last.clone(),
            Cursor::New => {
                cmd.arg("BLOCK").arg(self.block_ms);
                ">".to_string()
            }
        };
        cmd.arg("STREAMS").arg(&self.stream).arg(&start);

        let reply: Value = cmd
            .query(conn)
            .map_err(|e| RedisStreamsError::Command(format!("XREADGROUP failed: {e}")))?;
        let entries = parse_read_reply(reply)?;

        if let Cursor::Pending(_) = self.cursor {
            self.cursor = match entries.last() {
                Some(last) => Cursor::Pending(last.id.clone()),
                None => {
                    debug!(stream = %self.stream, consumer = %self.consumer, "pending entries drained");
                    Cursor::New
                }
            };
        }
        Ok(entries)
    }
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::Data(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        Value::Status(s) => Some(s.clone()),
        _ => None,
    }
}

fn malformed(what: &str) -> RedisStreamsError {
    RedisStreamsError::Deserialization(format!("unexpected XREADGROUP reply: {what}"))
}

/// Parse an XREADGROUP reply for a single stream.
///
/// Shape: `[[stream, [[id, [field, value, ...]], ...]]]`, or nil on a block
/// timeout. Pending entries that were trimmed from the stream come back
/// with nil fields.
fn parse_read_reply(reply: Value) -> Result<Vec<StreamEntry>, RedisStreamsError> {
    let streams = match reply {
        Value::Nil => return Ok(Vec::new()),
        Value::Bulk(streams) => streams,
        _ => return Err(malformed("top level is not an array")),
    };

    let mut entries = Vec::new();
    for stream in streams {
        let Value::Bulk(mut pair) = stream else {
            return Err(malformed("stream element is not an array"));
        };
        if pair.len() != 2 {
            return Err(malformed("stream element is not a [name, entries] pair"));
        }
        let Value::Bulk(raw_entries) = pair.remove(1) else {
            return Err(malformed("stream entries are not an array"));
        };

        for raw in raw_entries {
            let Value::Bulk(parts) = raw else {
                return Err(malformed("entry is not an array"));
            };
            let mut parts = parts.into_iter();
            let id = parts
                .next()
                .as_ref()
                .and_then(text)
                .ok_or_else(|| malformed("entry id missing"))?;

            let mut fields = HashMap::new();
            if let Some(Value::Bulk(flat)) = parts.next() {
                for chunk in flat.chunks(2) {
                    if let [k, v] = chunk {
                        if let (Some(k), Some(v)) = (text(k), text(v)) {
                            fields.insert(k, v);
                        }
                    }
                }
            }
            entries.push(StreamEntry { id, fields });
        }
    }
    Ok(entries)
}
