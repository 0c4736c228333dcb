//! Job dispatch helpers.
//!
//! Thin wrappers that pair each envelope type with its queue or exchange so
//! call sites cannot publish a job to the wrong destination.

use crate::models::{DocumentAnalysisJob, EmbeddingGenerationJob, Notification, TextExtractionJob};
use crate::topology::{exchanges, queues};
use broker_worker::Publisher;

/// Publishes pipeline jobs and notifications to their fixed destinations
#[derive(Clone)]
pub struct JobDispatcher {
    publisher: Publisher,
}

impl JobDispatcher {
    pub fn new(publisher: Publisher) -> Self {
        Self { publisher }
    }

    pub async fn dispatch_text_extraction(&self, job: &TextExtractionJob) -> bool {
        self.publisher
            .publish_to_queue(queues::TEXT_EXTRACTION, job)
            .await
    }

    pub async fn dispatch_embedding_generation(&self, job: &EmbeddingGenerationJob) -> bool {
        self.publisher
            .publish_to_queue(queues::EMBEDDING_GENERATION, job)
            .await
    }

    pub async fn dispatch_document_analysis(&self, job: &DocumentAnalysisJob) -> bool {
        self.publisher
            .publish_to_queue(queues::DOCUMENT_ANALYSIS, job)
            .await
    }

    /// Fan a notification out to every queue bound on the notifications
    /// exchange; the routing key is ignored by fanout
    pub async fn dispatch_notification(&self, notification: &Notification) -> bool {
        self.publisher
            .publish_to_exchange(exchanges::NOTIFICATIONS, "", notification)
            .await
    }
}
