//! Typed broker configuration
//!
//! All queue names, exchange names, retry limits and TTLs are enumerated here
//! at startup rather than scattered as literals across call sites.

use std::time::Duration;

/// Exchange type supported by the topology
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeType {
    /// Dot-separated routing keys matched against bindings
    Topic,
    /// Delivers to every bound queue, routing key ignored
    Fanout,
}

impl ExchangeType {
    pub(crate) fn to_lapin(self) -> lapin::ExchangeKind {
        match self {
            ExchangeType::Topic => lapin::ExchangeKind::Topic,
            ExchangeType::Fanout => lapin::ExchangeKind::Fanout,
        }
    }
}

/// A durable exchange declaration
#[derive(Debug, Clone)]
pub struct ExchangeSpec {
    pub name: String,
    pub kind: ExchangeType,
    pub durable: bool,
}

impl ExchangeSpec {
    pub fn topic(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ExchangeType::Topic,
            durable: true,
        }
    }

    pub fn fanout(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ExchangeType::Fanout,
            durable: true,
        }
    }
}

/// A durable work queue bound to the topic exchange.
///
/// Every work queue dead-letters into the shared dead-letter queue via the
/// default (unnamed) exchange and gets a companion delay queue for deferred
/// retries.
#[derive(Debug, Clone)]
pub struct WorkQueueSpec {
    pub name: String,
    /// Binding key on the topic exchange (e.g. "text.extraction")
    pub routing_key: String,
    pub max_retries: u32,
}

impl WorkQueueSpec {
    pub fn new(name: impl Into<String>, routing_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            routing_key: routing_key.into(),
            max_retries: 3,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

/// The terminal dead-letter queue: TTL only, no further dead-letter target
#[derive(Debug, Clone)]
pub struct DeadLetterSpec {
    pub name: String,
    /// How long poison messages stay visible before the broker drops them
    pub message_ttl: Duration,
}

/// The fixed broker topology, declared once before any traffic flows
#[derive(Debug, Clone)]
pub struct TopologyConfig {
    pub topic_exchange: ExchangeSpec,
    pub fanout_exchange: ExchangeSpec,
    pub work_queues: Vec<WorkQueueSpec>,
    /// Durable, bound to the fanout exchange with the empty routing key,
    /// no dead-letter target
    pub notification_queue: String,
    pub dead_letter: DeadLetterSpec,
}

impl TopologyConfig {
    /// Look up the work queue bound on a given routing key
    pub fn queue_for_routing_key(&self, routing_key: &str) -> Option<&WorkQueueSpec> {
        self.work_queues.iter().find(|q| q.routing_key == routing_key)
    }

    /// All queue names this topology declares (work, delay, notification,
    /// dead-letter) - used by admin introspection
    pub fn queue_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::with_capacity(self.work_queues.len() * 2 + 2);
        for queue in &self.work_queues {
            names.push(queue.name.clone());
            names.push(retry_queue_name(&queue.name));
        }
        names.push(self.notification_queue.clone());
        names.push(self.dead_letter.name.clone());
        names
    }
}

/// Name of the delay queue that defers retries for a work queue.
///
/// Expired messages dead-letter back into the work queue, so a retry survives
/// a process restart mid-backoff.
pub fn retry_queue_name(queue: &str) -> String {
    format!("{queue}.retry")
}

/// Per-subscription consumer behavior
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Attempts after which a failing message is dead-lettered
    pub max_retries: u32,

    /// Backoff unit; the nth failure waits `base_delay * n`
    pub base_delay: Duration,
}

impl ConsumerConfig {
    pub fn new() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(5),
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_topology() -> TopologyConfig {
        TopologyConfig {
            topic_exchange: ExchangeSpec::topic("jobs_exchange"),
            fanout_exchange: ExchangeSpec::fanout("events_exchange"),
            work_queues: vec![
                WorkQueueSpec::new("ocr_queue", "ocr.run"),
                WorkQueueSpec::new("index_queue", "index.run").with_max_retries(5),
            ],
            notification_queue: "events_queue".to_string(),
            dead_letter: DeadLetterSpec {
                name: "dead_queue".to_string(),
                message_ttl: Duration::from_secs(60),
            },
        }
    }

    #[test]
    fn test_work_queue_defaults() {
        let queue = WorkQueueSpec::new("ocr_queue", "ocr.run");
        assert_eq!(queue.max_retries, 3);
        assert_eq!(queue.routing_key, "ocr.run");
    }

    #[test]
    fn test_queue_for_routing_key() {
        let topology = test_topology();
        assert_eq!(
            topology.queue_for_routing_key("index.run").unwrap().name,
            "index_queue"
        );
        assert!(topology.queue_for_routing_key("unknown.key").is_none());
    }

    #[test]
    fn test_queue_names_include_delay_queues() {
        let topology = test_topology();
        let names = topology.queue_names();
        assert!(names.contains(&"ocr_queue".to_string()));
        assert!(names.contains(&"ocr_queue.retry".to_string()));
        assert!(names.contains(&"events_queue".to_string()));
        assert!(names.contains(&"dead_queue".to_string()));
        assert_eq!(names.len(), 6);
    }

    #[test]
    fn test_retry_queue_name() {
        assert_eq!(retry_queue_name("ocr_queue"), "ocr_queue.retry");
    }

    #[test]
    fn test_consumer_config_builder() {
        let config = ConsumerConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.base_delay, Duration::from_secs(5));

        let custom = ConsumerConfig::new()
            .with_max_retries(1)
            .with_base_delay(Duration::from_millis(100));
        assert_eq!(custom.max_retries, 1);
        assert_eq!(custom.base_delay, Duration::from_millis(100));
    }

    #[test]
    fn test_exchange_spec_constructors() {
        let topic = ExchangeSpec::topic("jobs_exchange");
        assert_eq!(topic.kind, ExchangeType::Topic);
        assert!(topic.durable);

        let fanout = ExchangeSpec::fanout("events_exchange");
        assert_eq!(fanout.kind, ExchangeType::Fanout);
        assert!(fanout.durable);
    }
}
