//! Envelope publisher.
//!
//! Serializes envelopes to JSON, marks them persistent, stamps the envelope
//! id as the broker message identifier plus a send-time timestamp, and hands
//! them to the shared channel. The boolean result means "the broker accepted
//! the write into its buffer", not "a consumer processed it"; with publisher
//! confirms enabled it additionally means the broker acknowledged the write.

use crate::connection::BrokerClient;
use crate::envelope::Envelope;
use crate::error::BrokerError;
use crate::metrics::QueueMetrics;
use chrono::Utc;
use lapin::options::BasicPublishOptions;
use lapin::publisher_confirm::Confirmation;
use lapin::BasicProperties;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Persistent delivery mode per the AMQP basic class
const DELIVERY_MODE_PERSISTENT: u8 = 2;

/// Publishes envelopes through the shared broker channel
#[derive(Clone)]
pub struct Publisher {
    client: Arc<BrokerClient>,
}

impl Publisher {
    pub fn new(client: Arc<BrokerClient>) -> Self {
        Self { client }
    }

    /// Publish directly to a queue through the default exchange.
    ///
    /// Returns `false` on serialization failure or broker rejection, logged
    /// at warn level; the core never auto-retries a publish.
    pub async fn publish_to_queue<E: Envelope>(&self, queue_name: &str, envelope: &E) -> bool {
        let metrics = QueueMetrics::new(queue_name);
        match self.try_publish("", queue_name, envelope, None).await {
            Ok(true) => {
                info!(
                    queue = queue_name,
                    message_id = envelope.envelope_id(),
                    "Message published to queue"
                );
                metrics.message_published();
                true
            }
            Ok(false) => {
                warn!(
                    queue = queue_name,
                    message_id = envelope.envelope_id(),
                    "Broker rejected publish to queue"
                );
                metrics.publish_failed();
                false
            }
            Err(e) => {
                warn!(
                    queue = queue_name,
                    message_id = envelope.envelope_id(),
                    error = %e,
                    "Failed to publish to queue"
                );
                metrics.publish_failed();
                false
            }
        }
    }

    /// Publish to an exchange with a routing key (empty for fanout).
    pub async fn publish_to_exchange<E: Envelope>(
        &self,
        exchange_name: &str,
        routing_key: &str,
        envelope: &E,
    ) -> bool {
        let metrics = QueueMetrics::new(exchange_name);
        match self
            .try_publish(exchange_name, routing_key, envelope, None)
            .await
        {
            Ok(true) => {
                info!(
                    exchange = exchange_name,
                    routing_key = routing_key,
                    message_id = envelope.envelope_id(),
                    "Message published to exchange"
                );
                metrics.message_published();
                true
            }
            Ok(false) => {
                warn!(
                    exchange = exchange_name,
                    message_id = envelope.envelope_id(),
                    "Broker rejected publish to exchange"
                );
                metrics.publish_failed();
                false
            }
            Err(e) => {
                warn!(
                    exchange = exchange_name,
                    message_id = envelope.envelope_id(),
                    error = %e,
                    "Failed to publish to exchange"
                );
                metrics.publish_failed();
                false
            }
        }
    }

    /// Publish a retry copy into a delay queue with a per-message expiration.
    ///
    /// Used by the consumer to defer redelivery without holding the
    /// unacknowledged original; the expired message dead-letters back into
    /// the work queue.
    pub(crate) async fn publish_with_delay<E: Envelope>(
        &self,
        queue_name: &str,
        envelope: &E,
        delay: Duration,
    ) -> Result<(), BrokerError> {
        match self
            .try_publish("", queue_name, envelope, Some(delay))
            .await?
        {
            true => Ok(()),
            false => Err(BrokerError::Publish(format!(
                "broker rejected delayed publish to {queue_name}"
            ))),
        }
    }

    async fn try_publish<E: Envelope>(
        &self,
        exchange_name: &str,
        routing_key: &str,
        envelope: &E,
        expiration: Option<Duration>,
    ) -> Result<bool, BrokerError> {
        let payload = serde_json::to_vec(envelope).map_err(|e| BrokerError::Publish(e.to_string()))?;
        let channel = self.client.channel().await?;

        let mut properties = BasicProperties::default()
            .with_delivery_mode(DELIVERY_MODE_PERSISTENT)
            .with_message_id(envelope.envelope_id().into())
            .with_timestamp(Utc::now().timestamp() as u64);
        if let Some(delay) = expiration {
            properties = properties.with_expiration(delay.as_millis().to_string().into());
        }

        let confirm = channel
            .basic_publish(
                exchange_name,
                routing_key,
                BasicPublishOptions::default(),
                &payload,
                properties,
            )
            .await
            .map_err(|e| BrokerError::Publish(e.to_string()))?;

        if self.client.publisher_confirms() {
            let confirmation = confirm
                .await
                .map_err(|e| BrokerError::Publish(e.to_string()))?;
            Ok(!matches!(confirmation, Confirmation::Nack(_)))
        } else {
            // Fire-and-forget: only local buffer acceptance is known here
            Ok(true)
        }
    }
}
