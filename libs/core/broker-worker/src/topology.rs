//! Idempotent topology declaration.
//!
//! Must run to completion before any publish or consume. Re-running with
//! identical arguments is a no-op; the broker rejects a redeclaration with
//! different arguments, which surfaces as `BrokerError::TopologyConflict` -
//! never change a queue's arguments without deleting it first.

use crate::config::{retry_queue_name, ExchangeSpec, TopologyConfig};
use crate::error::BrokerError;
use lapin::options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions};
use lapin::types::{AMQPValue, FieldTable};
use lapin::Channel;
use tracing::{debug, info};

fn durable_queue() -> QueueDeclareOptions {
    QueueDeclareOptions {
        durable: true,
        ..QueueDeclareOptions::default()
    }
}

/// Arguments for a work queue: dead-letter into the shared dead-letter queue
/// through the default (unnamed) exchange
fn work_queue_arguments(dead_letter_queue: &str, max_retries: u32) -> FieldTable {
    let mut arguments = FieldTable::default();
    arguments.insert("x-dead-letter-exchange".into(), AMQPValue::LongString("".into()));
    arguments.insert(
        "x-dead-letter-routing-key".into(),
        AMQPValue::LongString(dead_letter_queue.into()),
    );
    arguments.insert("x-max-retries".into(), AMQPValue::LongInt(max_retries as i32));
    arguments
}

/// Arguments for a delay queue: expired messages route back into the work
/// queue, again through the default exchange
fn delay_queue_arguments(work_queue: &str) -> FieldTable {
    let mut arguments = FieldTable::default();
    arguments.insert("x-dead-letter-exchange".into(), AMQPValue::LongString("".into()));
    arguments.insert(
        "x-dead-letter-routing-key".into(),
        AMQPValue::LongString(work_queue.into()),
    );
    arguments
}

async fn declare_exchange(channel: &Channel, spec: &ExchangeSpec) -> Result<(), BrokerError> {
    channel
        .exchange_declare(
            &spec.name,
            spec.kind.to_lapin(),
            ExchangeDeclareOptions {
                durable: spec.durable,
                ..ExchangeDeclareOptions::default()
            },
            FieldTable::default(),
        )
        .await?;
    debug!(exchange = %spec.name, kind = ?spec.kind, "Declared exchange");
    Ok(())
}

/// Declare the fixed topology: dead-letter queue first, then work queues with
/// their delay queues, the notification queue, both exchanges, and finally
/// the bindings.
pub async fn setup_topology(channel: &Channel, topology: &TopologyConfig) -> Result<(), BrokerError> {
    // Dead-letter queue: terminal, TTL only, no further dead-letter target
    let mut dlq_arguments = FieldTable::default();
    dlq_arguments.insert(
        "x-message-ttl".into(),
        AMQPValue::LongLongInt(topology.dead_letter.message_ttl.as_millis() as i64),
    );
    channel
        .queue_declare(&topology.dead_letter.name, durable_queue(), dlq_arguments)
        .await?;

    for queue in &topology.work_queues {
        channel
            .queue_declare(
                &queue.name,
                durable_queue(),
                work_queue_arguments(&topology.dead_letter.name, queue.max_retries),
            )
            .await?;

        channel
            .queue_declare(
                &retry_queue_name(&queue.name),
                durable_queue(),
                delay_queue_arguments(&queue.name),
            )
            .await?;
    }

    // Notification queue: durable, no dead-letter
    channel
        .queue_declare(&topology.notification_queue, durable_queue(), FieldTable::default())
        .await?;

    declare_exchange(channel, &topology.topic_exchange).await?;
    declare_exchange(channel, &topology.fanout_exchange).await?;

    for queue in &topology.work_queues {
        channel
            .queue_bind(
                &queue.name,
                &topology.topic_exchange.name,
                &queue.routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;
    }

    // Fanout binding uses the empty routing key
    channel
        .queue_bind(
            &topology.notification_queue,
            &topology.fanout_exchange.name,
            "",
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await?;

    info!(
        work_queues = topology.work_queues.len(),
        dead_letter = %topology.dead_letter.name,
        "Broker topology configured"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argument<'a>(table: &'a FieldTable, key: &str) -> Option<&'a AMQPValue> {
        table
            .inner()
            .iter()
            .find(|(k, _)| k.as_str() == key)
            .map(|(_, v)| v)
    }

    #[test]
    fn test_work_queue_arguments() {
        let arguments = work_queue_arguments("dead_letter_queue", 3);

        assert_eq!(
            argument(&arguments, "x-dead-letter-exchange"),
            Some(&AMQPValue::LongString("".into()))
        );
        assert_eq!(
            argument(&arguments, "x-dead-letter-routing-key"),
            Some(&AMQPValue::LongString("dead_letter_queue".into()))
        );
        assert_eq!(
            argument(&arguments, "x-max-retries"),
            Some(&AMQPValue::LongInt(3))
        );
    }

    #[test]
    fn test_delay_queue_arguments_route_back_to_work_queue() {
        let arguments = delay_queue_arguments("text_extraction_queue");

        assert_eq!(
            argument(&arguments, "x-dead-letter-exchange"),
            Some(&AMQPValue::LongString("".into()))
        );
        assert_eq!(
            argument(&arguments, "x-dead-letter-routing-key"),
            Some(&AMQPValue::LongString("text_extraction_queue".into()))
        );
        // Delay queues carry no queue-level TTL; expiry is per message
        assert!(argument(&arguments, "x-message-ttl").is_none());
    }

    #[test]
    fn test_durable_queue_options() {
        let options = durable_queue();
        assert!(options.durable);
        assert!(!options.exclusive);
        assert!(!options.auto_delete);
    }
}
