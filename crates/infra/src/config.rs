//! Replication configuration.
//!
//! Everything a producer or consumer needs to agree on (topic names,
//! partition count, consumer group prefix) lives in one struct that is built
//! once and passed in at construction.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use storefront_events::{ConsumerGroup, EntityType, TopicConfig, TopicRouter};

use crate::workers::RetryPolicy;

const DEFAULT_SERVICE_NAME: &str = "order-service";
const DEFAULT_STREAM_PREFIX: &str = "storefront";
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_BACKOFF_MS: u64 = 200;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReplicationConfig {
    pub redis_url: String,
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default)]
    pub topics: TopicConfig,
    /// Consumer group prefix: groups are named `<service_name>-<entity>`.
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Namespace for every Redis key this service touches.
    #[serde(default = "default_stream_prefix")]
    pub stream_prefix: String,
}

fn default_service_name() -> String {
    DEFAULT_SERVICE_NAME.to_string()
}

fn default_stream_prefix() -> String {
    DEFAULT_STREAM_PREFIX.to_string()
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_retry_backoff_ms() -> u64 {
    DEFAULT_RETRY_BACKOFF_MS
}

impl ReplicationConfig {
    /// Load from process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let redis_url = lookup("REDIS_URL").context("REDIS_URL is required")?;
        let defaults = TopicConfig::default();

        Ok(Self {
            redis_url,
            database_url: lookup("DATABASE_URL"),
            topics: TopicConfig {
                customer_events: lookup("TOPIC_CUSTOMER_EVENTS").unwrap_or(defaults.customer_events),
                product_events: lookup("TOPIC_PRODUCT_EVENTS").unwrap_or(defaults.product_events),
                partitions: parse_or(&lookup, "TOPIC_PARTITIONS", defaults.partitions)?,
            },
            service_name: lookup("SERVICE_NAME").unwrap_or_else(default_service_name),
            max_attempts: parse_or(&lookup, "CONSUMER_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?,
            retry_backoff_ms: parse_or(
                &lookup,
                "CONSUMER_RETRY_BACKOFF_MS",
                DEFAULT_RETRY_BACKOFF_MS,
            )?,
            stream_prefix: lookup("STREAM_PREFIX").unwrap_or_else(default_stream_prefix),
        })
    }

    /// `DATABASE_URL`, required by the replicator binary only.
    pub fn require_database_url(&self) -> Result<&str> {
        self.database_url
            .as_deref()
            .context("DATABASE_URL is required")
    }

    pub fn router(&self) -> TopicRouter {
        TopicRouter::new(self.topics.clone())
    }

    pub fn group(&self, entity: EntityType) -> ConsumerGroup {
        ConsumerGroup::new(&self.service_name, entity)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} must be a non-negative integer, got {raw:?}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn redis_url_is_required() {
        let err = ReplicationConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(err.to_string().contains("REDIS_URL"));
    }

    #[test]
    fn defaults_apply() {
        let config =
            ReplicationConfig::from_lookup(lookup(&[("REDIS_URL", "redis://localhost")])).unwrap();
        assert_eq!(config.topics, TopicConfig::default());
        assert_eq!(config.service_name, "order-service");
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.retry_backoff_ms, 200);
        assert_eq!(config.stream_prefix, "storefront");
        assert!(config.require_database_url().is_err());
        assert_eq!(
            config.group(EntityType::Product).as_str(),
            "order-service-product"
        );
    }

    #[test]
    fn overrides_apply() {
        let config = ReplicationConfig::from_lookup(lookup(&[
            ("REDIS_URL", "redis://cache:6379"),
            ("DATABASE_URL", "postgres://db/orders"),
            ("TOPIC_CUSTOMER_EVENTS", "crm.customers"),
            ("TOPIC_PARTITIONS", "8"),
            ("SERVICE_NAME", "billing-service"),
            ("CONSUMER_MAX_ATTEMPTS", "5"),
        ]))
        .unwrap();

        assert_eq!(config.require_database_url().unwrap(), "postgres://db/orders");
        assert_eq!(config.router().topic_for(EntityType::Customer), "crm.customers");
        assert_eq!(config.router().topic_for(EntityType::Product), "product-events");
        assert_eq!(config.router().partitions(), 8);
        assert_eq!(
            config.group(EntityType::Customer).as_str(),
            "billing-service-customer"
        );
        assert_eq!(config.retry_policy().max_attempts, 5);
    }

    #[test]
    fn rejects_non_numeric_partition_count() {
        let err = ReplicationConfig::from_lookup(lookup(&[
            ("REDIS_URL", "redis://localhost"),
            ("TOPIC_PARTITIONS", "many"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("TOPIC_PARTITIONS"));
    }

    #[test]
    fn deserializes_from_json_with_defaults() {
        let config: ReplicationConfig =
            serde_json::from_str(r#"{"redis_url": "redis://localhost", "max_attempts": 0}"#)
                .unwrap();
        assert_eq!(config.topics.partitions, 3);
        // Zero attempts would never run the handler.
        assert_eq!(config.retry_policy().max_attempts, 1);
    }
}
