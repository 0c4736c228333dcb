//! Queue introspection and maintenance.
//!
//! Admin operations never fail loudly: an unreachable or missing queue is
//! reported as `None` (or `false` for purge) and logged, so a monitoring
//! sweep keeps going when one queue misbehaves.

use crate::connection::BrokerClient;
use crate::metrics::QueueMetrics;
use lapin::options::{QueueDeclareOptions, QueuePurgeOptions};
use lapin::types::FieldTable;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Point-in-time snapshot of a queue
#[derive(Debug, Clone, Serialize)]
pub struct QueueInfo {
    pub queue: String,
    pub message_count: u32,
    pub consumer_count: u32,
}

/// Admin operations over the shared broker channel
#[derive(Clone)]
pub struct QueueAdmin {
    client: Arc<BrokerClient>,
}

impl QueueAdmin {
    pub fn new(client: Arc<BrokerClient>) -> Self {
        Self { client }
    }

    /// Passive snapshot of a queue's depth and consumer count.
    ///
    /// Returns `None` when the queue does not exist or the broker cannot be
    /// reached. A failed passive declare closes the channel, so a reconnect
    /// is driven before the next operation.
    pub async fn queue_info(&self, queue_name: &str) -> Option<QueueInfo> {
        let channel = match self.client.channel().await {
            Ok(channel) => channel,
            Err(e) => {
                warn!(queue = queue_name, error = %e, "Queue info unavailable, not connected");
                return None;
            }
        };

        let declared = channel
            .queue_declare(
                queue_name,
                QueueDeclareOptions {
                    passive: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await;

        match declared {
            Ok(queue) => {
                let info = QueueInfo {
                    queue: queue_name.to_string(),
                    message_count: queue.message_count(),
                    consumer_count: queue.consumer_count(),
                };
                QueueMetrics::new(queue_name).queue_depth(info.message_count);
                Some(info)
            }
            Err(e) => {
                // Passive declare of a missing queue is a channel-level 404
                let message = e.to_string();
                if message.contains("NOT-FOUND") || message.contains("NOT_FOUND") {
                    warn!(queue = queue_name, "Queue does not exist");
                } else {
                    warn!(queue = queue_name, error = %e, "Failed to inspect queue");
                }
                if let Err(e) = self.client.ensure_connected().await {
                    warn!(error = %e, "Reconnect after failed queue inspection");
                }
                None
            }
        }
    }

    /// Snapshot every queue the topology declares, skipping any that cannot
    /// be inspected
    pub async fn all_queues_info(&self) -> Vec<QueueInfo> {
        let mut infos = Vec::new();
        for queue_name in self.client.topology().queue_names() {
            if let Some(info) = self.queue_info(&queue_name).await {
                infos.push(info);
            }
        }
        infos
    }

    /// Drop all ready messages from a queue. Unacknowledged in-flight
    /// deliveries are not affected. Returns `false` on failure.
    pub async fn purge_queue(&self, queue_name: &str) -> bool {
        let channel = match self.client.channel().await {
            Ok(channel) => channel,
            Err(e) => {
                warn!(queue = queue_name, error = %e, "Purge failed, not connected");
                return false;
            }
        };

        match channel
            .queue_purge(queue_name, QueuePurgeOptions::default())
            .await
        {
            Ok(count) => {
                info!(queue = queue_name, purged = count, "Queue purged");
                true
            }
            Err(e) => {
                warn!(queue = queue_name, error = %e, "Purge failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DeadLetterSpec, ExchangeSpec, TopologyConfig, WorkQueueSpec};
    use std::time::Duration;

    fn disconnected_admin() -> QueueAdmin {
        let topology = TopologyConfig {
            topic_exchange: ExchangeSpec::topic("jobs_exchange"),
            fanout_exchange: ExchangeSpec::fanout("events_exchange"),
            work_queues: vec![WorkQueueSpec::new("ocr_queue", "ocr.run")],
            notification_queue: "events_queue".to_string(),
            dead_letter: DeadLetterSpec {
                name: "dead_queue".to_string(),
                message_ttl: Duration::from_secs(60),
            },
        };
        QueueAdmin::new(Arc::new(BrokerClient::disconnected(topology)))
    }

    #[test]
    fn test_queue_info_serializes() {
        let info = QueueInfo {
            queue: "text_extraction_queue".to_string(),
            message_count: 7,
            consumer_count: 1,
        };

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["queue"], "text_extraction_queue");
        assert_eq!(json["message_count"], 7);
        assert_eq!(json["consumer_count"], 1);
    }

    #[tokio::test]
    async fn test_queue_info_is_none_without_connection() {
        let admin = disconnected_admin();
        assert!(admin.queue_info("ocr_queue").await.is_none());
    }

    #[tokio::test]
    async fn test_all_queues_info_skips_unreachable_queues() {
        let admin = disconnected_admin();
        // Nothing inspectable: the sweep completes and returns what it got
        assert!(admin.all_queues_info().await.is_empty());
    }

    #[tokio::test]
    async fn test_purge_is_false_without_connection() {
        let admin = disconnected_admin();
        assert!(!admin.purge_queue("ocr_queue").await);
    }
}
