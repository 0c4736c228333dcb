//! Envelope traits for messages moved through the broker.
//!
//! An envelope is immutable once published: a retry never mutates the
//! persisted message body, it publishes a fresh in-memory copy with the
//! attempt count incremented.

use serde::{de::DeserializeOwned, Serialize};

/// Anything the publisher can hand to the broker.
///
/// The id doubles as the broker-level message identifier, so it must be
/// stable for a given logical unit of work.
pub trait Envelope: Serialize + Send + Sync {
    /// Stable identifier of the logical job or notification
    fn envelope_id(&self) -> &str;
}

/// A retryable job envelope consumed from a work queue.
///
/// # Example
///
/// ```rust,ignore
/// use broker_worker::{Envelope, JobEnvelope};
///
/// #[derive(Clone, Serialize, Deserialize)]
/// struct OcrJob {
///     id: String,
///     asset_id: String,
///     attempts: u32,
/// }
///
/// impl Envelope for OcrJob {
///     fn envelope_id(&self) -> &str {
///         &self.id
///     }
/// }
///
/// impl JobEnvelope for OcrJob {
///     fn attempts(&self) -> u32 {
///         self.attempts
///     }
///
///     fn with_attempt(&self) -> Self {
///         Self {
///             attempts: self.attempts.saturating_add(1),
///             ..self.clone()
///         }
///     }
/// }
/// ```
pub trait JobEnvelope: Envelope + DeserializeOwned + Clone {
    /// Delivery attempts so far; 0 at first delivery, monotonically
    /// non-decreasing across redelivery
    fn attempts(&self) -> u32;

    /// A new copy with the attempt count incremented and the id unchanged
    fn with_attempt(&self) -> Self;
}
