//! Document processing pipeline domain: envelopes, broker topology and
//! dispatch helpers

pub mod models;
pub mod service;
pub mod topology;

pub use models::{
    ContactMethod, DocumentAnalysisJob, EmbeddingGenerationJob, Notification, OtpRequest,
    TextExtractionJob,
};
pub use service::JobDispatcher;
pub use topology::{exchanges, queues, routing_keys, topology, DEAD_LETTER_TTL, MAX_RETRIES};
