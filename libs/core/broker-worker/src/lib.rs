//! RabbitMQ job queue framework.
//!
//! A thin, typed layer over [lapin] that owns the pieces every worker needs:
//!
//! - [`BrokerClient`]: single connection and channel per process, with an
//!   explicit reconnect state machine and topology re-declaration
//! - [`setup_topology`]: idempotent declaration of durable exchanges, work
//!   queues with dead-lettering, delay queues and the dead-letter queue
//! - [`Publisher`]: persistent JSON publishing with optional broker confirms
//! - [`QueueConsumer`]: prefetch-1 consumption with a bounded retry budget;
//!   retries are deferred through per-message TTLs so backoff survives a
//!   process restart
//! - [`QueueAdmin`]: passive queue introspection and purging
//!
//! Domain crates define their envelopes by implementing [`Envelope`] (and
//! [`JobEnvelope`] for retryable work) and their handlers by implementing
//! [`JobProcessor`].

pub mod admin;
pub mod config;
pub mod connection;
pub mod consumer;
pub mod envelope;
pub mod error;
pub mod metrics;
pub mod publisher;
pub mod topology;

pub use admin::{QueueAdmin, QueueInfo};
pub use config::{
    retry_queue_name, ConsumerConfig, DeadLetterSpec, ExchangeSpec, ExchangeType, TopologyConfig,
    WorkQueueSpec,
};
pub use connection::{BrokerClient, ConnectOptions, ConnectionState};
pub use consumer::{JobProcessor, QueueConsumer};
pub use envelope::{Envelope, JobEnvelope};
pub use error::{BrokerError, ProcessingFailure};
pub use metrics::{init_metrics, render_metrics, QueueMetrics};
pub use publisher::Publisher;
pub use topology::setup_topology;
