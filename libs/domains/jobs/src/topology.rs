//! The fixed broker topology for the document processing pipeline.
//!
//! These names are shared with every other service that talks to the broker;
//! changing a queue's arguments here requires deleting the queue first or the
//! declaration fails with a topology conflict.

use broker_worker::{DeadLetterSpec, ExchangeSpec, TopologyConfig, WorkQueueSpec};
use std::time::Duration;

pub mod queues {
    pub const TEXT_EXTRACTION: &str = "text_extraction_queue";
    pub const EMBEDDING_GENERATION: &str = "embedding_generation_queue";
    pub const DOCUMENT_ANALYSIS: &str = "document_analysis_queue";
    pub const NOTIFICATIONS: &str = "notifications_queue";
    pub const DEAD_LETTER: &str = "dead_letter_queue";
    /// Consumed by the standalone OTP worker, not part of the pipeline
    /// topology
    pub const OTP_REQUESTS: &str = "otp-requests";
}

pub mod exchanges {
    pub const PROCESSING: &str = "processing_exchange";
    pub const NOTIFICATIONS: &str = "notifications_exchange";
}

pub mod routing_keys {
    pub const TEXT_EXTRACTION: &str = "text.extraction";
    pub const EMBEDDING_GENERATION: &str = "embedding.generation";
    pub const DOCUMENT_ANALYSIS: &str = "document.analysis";
}

/// Poison messages stay inspectable for a day before the broker drops them
pub const DEAD_LETTER_TTL: Duration = Duration::from_secs(24 * 60 * 60);

pub const MAX_RETRIES: u32 = 3;

/// Build the pipeline topology: the topic exchange with its three work
/// queues, the fanout exchange with the notification queue, and the shared
/// dead-letter queue.
pub fn topology() -> TopologyConfig {
    TopologyConfig {
        topic_exchange: ExchangeSpec::topic(exchanges::PROCESSING),
        fanout_exchange: ExchangeSpec::fanout(exchanges::NOTIFICATIONS),
        work_queues: vec![
            WorkQueueSpec::new(queues::TEXT_EXTRACTION, routing_keys::TEXT_EXTRACTION)
                .with_max_retries(MAX_RETRIES),
            WorkQueueSpec::new(queues::EMBEDDING_GENERATION, routing_keys::EMBEDDING_GENERATION)
                .with_max_retries(MAX_RETRIES),
            WorkQueueSpec::new(queues::DOCUMENT_ANALYSIS, routing_keys::DOCUMENT_ANALYSIS)
                .with_max_retries(MAX_RETRIES),
        ],
        notification_queue: queues::NOTIFICATIONS.to_string(),
        dead_letter: DeadLetterSpec {
            name: queues::DEAD_LETTER.to_string(),
            message_ttl: DEAD_LETTER_TTL,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topology_declares_all_pipeline_queues() {
        let topology = topology();
        let names = topology.queue_names();

        assert!(names.contains(&queues::TEXT_EXTRACTION.to_string()));
        assert!(names.contains(&queues::EMBEDDING_GENERATION.to_string()));
        assert!(names.contains(&queues::DOCUMENT_ANALYSIS.to_string()));
        assert!(names.contains(&queues::NOTIFICATIONS.to_string()));
        assert!(names.contains(&queues::DEAD_LETTER.to_string()));
        // Each work queue brings its companion delay queue
        assert!(names.contains(&"text_extraction_queue.retry".to_string()));
        assert_eq!(names.len(), 8);
    }

    #[test]
    fn test_routing_keys_resolve_to_queues() {
        let topology = topology();
        assert_eq!(
            topology
                .queue_for_routing_key(routing_keys::EMBEDDING_GENERATION)
                .unwrap()
                .name,
            queues::EMBEDDING_GENERATION
        );
    }

    #[test]
    fn test_dead_letter_ttl_is_twenty_four_hours() {
        assert_eq!(topology().dead_letter.message_ttl, Duration::from_secs(86_400));
    }

    #[test]
    fn test_work_queues_share_the_retry_budget() {
        for queue in &topology().work_queues {
            assert_eq!(queue.max_retries, MAX_RETRIES);
        }
    }
}
