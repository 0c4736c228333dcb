//! Broker error types
//!
//! The taxonomy mirrors how failures are handled:
//! - **Connection**: broker unreachable or channel dropped; fatal at startup,
//!   handled by the reconnect state machine mid-run
//! - **TopologyConflict**: redeclaration of a queue/exchange with mismatched
//!   arguments; fatal at startup
//! - **Publish**: serialization or buffer rejection; non-fatal, surfaced as a
//!   boolean to callers
//! - **Parse**: malformed message body; terminal dead-letter, no retry
//! - **Shutdown**: cooperative stop requested

use thiserror::Error;

/// Broker and queue processing errors
#[derive(Error, Debug)]
pub enum BrokerError {
    /// Broker unreachable, connection dropped, or channel unusable
    #[error("Broker connection error: {0}")]
    Connection(String),

    /// Queue or exchange redeclared with different arguments
    #[error("Topology conflict: {0}")]
    TopologyConflict(String),

    /// Message could not be handed to the broker
    #[error("Publish error: {0}")]
    Publish(String),

    /// Message body could not be parsed as an envelope
    #[error("Parse error: {0}")]
    Parse(String),

    /// Shutdown requested
    #[error("Shutdown requested")]
    Shutdown,
}

impl BrokerError {
    pub fn is_connection_error(&self) -> bool {
        matches!(self, BrokerError::Connection(_))
    }

    pub fn is_topology_conflict(&self) -> bool {
        matches!(self, BrokerError::TopologyConflict(_))
    }
}

impl From<lapin::Error> for BrokerError {
    fn from(err: lapin::Error) -> Self {
        let message = err.to_string();
        // The broker rejects a mismatched redeclaration with a 406
        if message.contains("PRECONDITION-FAILED") || message.contains("PRECONDITION_FAILED") {
            BrokerError::TopologyConflict(message)
        } else {
            BrokerError::Connection(message)
        }
    }
}

impl From<serde_json::Error> for BrokerError {
    fn from(err: serde_json::Error) -> Self {
        BrokerError::Parse(err.to_string())
    }
}

/// Failure reported by a processing callback.
///
/// Carries only a reason for the logs; the retry decision is driven by the
/// envelope's attempt count, not by the failure itself.
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct ProcessingFailure {
    pub message: String,
}

impl ProcessingFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for ProcessingFailure {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for ProcessingFailure {
    fn from(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_from_serde() {
        let err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let broker_err = BrokerError::from(err);
        assert!(matches!(broker_err, BrokerError::Parse(_)));
    }

    #[test]
    fn test_error_classification() {
        let conn = BrokerError::Connection("refused".to_string());
        assert!(conn.is_connection_error());
        assert!(!conn.is_topology_conflict());

        let conflict = BrokerError::TopologyConflict("x-message-ttl mismatch".to_string());
        assert!(conflict.is_topology_conflict());
        assert!(!conflict.is_connection_error());
    }

    #[test]
    fn test_processing_failure_display() {
        let failure = ProcessingFailure::new("ocr engine unavailable");
        assert_eq!(failure.to_string(), "ocr engine unavailable");

        let from_str: ProcessingFailure = "boom".into();
        assert_eq!(from_str.message, "boom");
    }
}
