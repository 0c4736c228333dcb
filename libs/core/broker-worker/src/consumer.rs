//! Work queue consumer.
//!
//! One consumer task per queue, prefetch 1, so deliveries within a queue are
//! strictly sequential while separate queues progress concurrently. Failed
//! jobs are re-published into the queue's delay queue with a per-message
//! expiration instead of being redelivered immediately; after the retry
//! budget is spent the message is rejected without requeue and the broker
//! routes it to the dead-letter queue.

use crate::config::{retry_queue_name, ConsumerConfig};
use crate::connection::BrokerClient;
use crate::envelope::JobEnvelope;
use crate::error::{BrokerError, ProcessingFailure};
use crate::metrics::QueueMetrics;
use crate::publisher::Publisher;
use async_trait::async_trait;
use futures::{FutureExt, StreamExt};
use lapin::message::Delivery;
use lapin::options::{BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions};
use lapin::types::FieldTable;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Handles one decoded job envelope.
///
/// A returned `ProcessingFailure` counts against the retry budget; a panic
/// is treated as unretryable and dead-letters the message immediately.
#[async_trait]
pub trait JobProcessor<E: JobEnvelope>: Send + Sync {
    async fn process(&self, envelope: &E) -> Result<(), ProcessingFailure>;

    fn name(&self) -> &str;
}

/// Outcome chosen for a failed delivery
#[derive(Debug, Clone, PartialEq, Eq)]
enum RetryDecision {
    Retry { attempts: u32, delay: Duration },
    DeadLetter { attempts: u32 },
}

/// Pick the next step for a failed delivery.
///
/// `attempts` is the count carried in the envelope, so the first failure
/// sees 0. The retry delay grows linearly with the attempt number.
fn decide(attempts: u32, config: &ConsumerConfig) -> RetryDecision {
    let next = attempts.saturating_add(1);
    if next < config.max_retries {
        RetryDecision::Retry {
            attempts: next,
            delay: config.base_delay * next,
        }
    } else {
        RetryDecision::DeadLetter { attempts: next }
    }
}

/// A dropped shutdown sender counts as a stop request, so an orphaned
/// consumer cannot spin on a closed channel
fn shutdown_requested(changed: Result<(), watch::error::RecvError>, stop: bool) -> bool {
    changed.is_err() || stop
}

/// Consumes one work queue with a single processor
pub struct QueueConsumer<E, P>
where
    E: JobEnvelope,
    P: JobProcessor<E>,
{
    client: Arc<BrokerClient>,
    publisher: Publisher,
    queue_name: String,
    processor: P,
    config: ConsumerConfig,
    metrics: QueueMetrics,
    _envelope: std::marker::PhantomData<E>,
}

impl<E, P> QueueConsumer<E, P>
where
    E: JobEnvelope,
    P: JobProcessor<E>,
{
    pub fn new(
        client: Arc<BrokerClient>,
        queue_name: impl Into<String>,
        processor: P,
        config: ConsumerConfig,
    ) -> Self {
        let queue_name = queue_name.into();
        Self {
            publisher: Publisher::new(Arc::clone(&client)),
            metrics: QueueMetrics::new(queue_name.clone()),
            client,
            queue_name,
            processor,
            config,
            _envelope: std::marker::PhantomData,
        }
    }

    /// Consume until the shutdown signal flips to `true`.
    ///
    /// In-flight deliveries finish before the loop exits. When the delivery
    /// stream ends (connection lost) the consumer drives a reconnect and
    /// resubscribes.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), BrokerError> {
        info!(
            queue = %self.queue_name,
            processor = self.processor.name(),
            "Starting consumer"
        );

        loop {
            if *shutdown.borrow() {
                return Err(BrokerError::Shutdown);
            }

            let channel = self.client.channel().await?;
            channel.basic_qos(1, BasicQosOptions::default()).await?;

            let consumer_tag = format!("{}-{}", self.queue_name, Uuid::new_v4());
            let mut deliveries = channel
                .basic_consume(
                    &self.queue_name,
                    &consumer_tag,
                    BasicConsumeOptions::default(),
                    FieldTable::default(),
                )
                .await?;

            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if shutdown_requested(changed, *shutdown.borrow()) {
                            info!(queue = %self.queue_name, "Consumer shutting down");
                            return Err(BrokerError::Shutdown);
                        }
                    }
                    delivery = deliveries.next() => {
                        match delivery {
                            Some(Ok(delivery)) => self.handle_delivery(delivery).await,
                            Some(Err(e)) => {
                                warn!(queue = %self.queue_name, error = %e, "Delivery error");
                            }
                            None => {
                                warn!(queue = %self.queue_name, "Delivery stream ended, reconnecting");
                                break;
                            }
                        }
                    }
                }
            }

            self.client.ensure_connected().await?;
        }
    }

    async fn handle_delivery(&self, delivery: Delivery) {
        let envelope: E = match serde_json::from_slice(&delivery.data) {
            Ok(envelope) => envelope,
            Err(e) => {
                // Unparseable payloads can never succeed; quarantine them
                error!(
                    queue = %self.queue_name,
                    error = %e,
                    "Unparseable message, routing to dead-letter queue"
                );
                self.metrics.job_dead_lettered();
                self.nack_no_requeue(&delivery).await;
                return;
            }
        };

        let message_id = envelope.envelope_id().to_string();
        let attempts = envelope.attempts();
        debug!(
            queue = %self.queue_name,
            message_id = %message_id,
            attempts = attempts,
            "Processing job"
        );

        let started = std::time::Instant::now();
        let outcome = AssertUnwindSafe(self.processor.process(&envelope))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(())) => {
                self.metrics.job_processed(started.elapsed());
                if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                    warn!(queue = %self.queue_name, message_id = %message_id, error = %e, "Ack failed");
                }
                info!(
                    queue = %self.queue_name,
                    message_id = %message_id,
                    "Job processed"
                );
            }
            Ok(Err(failure)) => {
                self.metrics.job_failed();
                match decide(attempts, &self.config) {
                    RetryDecision::Retry { attempts, delay } => {
                        self.schedule_retry(&delivery, &envelope, attempts, delay, &failure)
                            .await;
                    }
                    RetryDecision::DeadLetter { attempts } => {
                        error!(
                            queue = %self.queue_name,
                            message_id = %message_id,
                            attempts = attempts,
                            error = %failure,
                            "Retries exhausted, routing to dead-letter queue"
                        );
                        self.metrics.job_dead_lettered();
                        self.nack_no_requeue(&delivery).await;
                    }
                }
            }
            Err(_) => {
                // A panicking processor is a bug, not a transient failure
                error!(
                    queue = %self.queue_name,
                    message_id = %message_id,
                    "Processor panicked, routing to dead-letter queue"
                );
                self.metrics.job_failed();
                self.metrics.job_dead_lettered();
                self.nack_no_requeue(&delivery).await;
            }
        }
    }

    async fn schedule_retry(
        &self,
        delivery: &Delivery,
        envelope: &E,
        attempts: u32,
        delay: Duration,
        failure: &ProcessingFailure,
    ) {
        let retry = envelope.with_attempt();
        let retry_queue = retry_queue_name(&self.queue_name);
        match self
            .publisher
            .publish_with_delay(&retry_queue, &retry, delay)
            .await
        {
            Ok(()) => {
                warn!(
                    queue = %self.queue_name,
                    message_id = %retry.envelope_id(),
                    attempts = attempts,
                    delay_secs = delay.as_secs(),
                    error = %failure,
                    "Job failed, retry scheduled"
                );
                self.metrics.job_retried();
                if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                    warn!(queue = %self.queue_name, error = %e, "Ack after retry publish failed");
                }
            }
            Err(e) => {
                // Could not park the retry copy; put the original back
                error!(
                    queue = %self.queue_name,
                    message_id = %envelope.envelope_id(),
                    error = %e,
                    "Retry publish failed, requeueing original"
                );
                if let Err(e) = delivery
                    .nack(BasicNackOptions {
                        requeue: true,
                        ..BasicNackOptions::default()
                    })
                    .await
                {
                    warn!(queue = %self.queue_name, error = %e, "Requeue nack failed");
                }
            }
        }
    }

    async fn nack_no_requeue(&self, delivery: &Delivery) {
        if let Err(e) = delivery
            .nack(BasicNackOptions {
                requeue: false,
                ..BasicNackOptions::default()
            })
            .await
        {
            warn!(queue = %self.queue_name, error = %e, "Nack failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ConsumerConfig {
        ConsumerConfig::default()
    }

    #[test]
    fn test_first_failure_retries_with_base_delay() {
        let decision = decide(0, &config());
        assert_eq!(
            decision,
            RetryDecision::Retry {
                attempts: 1,
                delay: Duration::from_secs(5),
            }
        );
    }

    #[test]
    fn test_second_failure_doubles_the_delay() {
        let decision = decide(1, &config());
        assert_eq!(
            decision,
            RetryDecision::Retry {
                attempts: 2,
                delay: Duration::from_secs(10),
            }
        );
    }

    #[test]
    fn test_third_failure_dead_letters() {
        let decision = decide(2, &config());
        assert_eq!(decision, RetryDecision::DeadLetter { attempts: 3 });
    }

    #[test]
    fn test_custom_retry_budget() {
        let config = ConsumerConfig::new()
            .with_max_retries(5)
            .with_base_delay(Duration::from_secs(2));

        assert_eq!(
            decide(3, &config),
            RetryDecision::Retry {
                attempts: 4,
                delay: Duration::from_secs(8),
            }
        );
        assert_eq!(decide(4, &config), RetryDecision::DeadLetter { attempts: 5 });
    }

    #[test]
    fn test_zero_retry_budget_dead_letters_immediately() {
        let config = ConsumerConfig::new().with_max_retries(1);
        assert_eq!(decide(0, &config), RetryDecision::DeadLetter { attempts: 1 });
    }

    #[test]
    fn test_attempt_counter_saturates_instead_of_wrapping() {
        // A wire message may carry any u32; the counter must not wrap back
        // below the budget and resurrect the retry loop
        assert_eq!(
            decide(u32::MAX, &config()),
            RetryDecision::DeadLetter { attempts: u32::MAX }
        );
    }

    #[tokio::test]
    async fn test_dropped_shutdown_sender_requests_stop() {
        let (tx, mut rx) = watch::channel(false);
        drop(tx);

        let changed = rx.changed().await;
        assert!(shutdown_requested(changed, *rx.borrow()));
    }

    #[tokio::test]
    async fn test_shutdown_signal_requests_stop() {
        let (tx, mut rx) = watch::channel(false);
        tx.send(true).unwrap();

        let changed = rx.changed().await;
        assert!(shutdown_requested(changed, *rx.borrow()));
    }

    #[tokio::test]
    async fn test_spurious_wakeup_keeps_consuming() {
        let (tx, mut rx) = watch::channel(false);
        tx.send(false).unwrap();

        let changed = rx.changed().await;
        assert!(!shutdown_requested(changed, *rx.borrow()));
    }
}
