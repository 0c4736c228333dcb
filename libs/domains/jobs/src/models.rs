//! Job and notification envelopes.
//!
//! Wire format is camelCase JSON. Job ids are deterministic for a unit of
//! work so redeliveries and retries keep the same broker message id.

use broker_worker::{Envelope, JobEnvelope};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Extract text from an uploaded asset
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TextExtractionJob {
    pub id: String,
    pub asset_id: String,
    pub user_id: String,
    pub file_path: String,
    pub file_type: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub attempts: u32,
}

impl TextExtractionJob {
    pub fn new(
        asset_id: impl Into<String>,
        user_id: impl Into<String>,
        file_path: impl Into<String>,
        file_type: impl Into<String>,
    ) -> Self {
        let asset_id = asset_id.into();
        Self {
            id: format!("text_extraction_{asset_id}"),
            asset_id,
            user_id: user_id.into(),
            file_path: file_path.into(),
            file_type: file_type.into(),
            timestamp: Utc::now(),
            attempts: 0,
        }
    }
}

impl Envelope for TextExtractionJob {
    fn envelope_id(&self) -> &str {
        &self.id
    }
}

impl JobEnvelope for TextExtractionJob {
    fn attempts(&self) -> u32 {
        self.attempts
    }

    fn with_attempt(&self) -> Self {
        Self {
            attempts: self.attempts.saturating_add(1),
            ..self.clone()
        }
    }
}

/// Generate embeddings for previously extracted text
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingGenerationJob {
    pub id: String,
    pub asset_id: String,
    pub user_id: String,
    pub extracted_text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub attempts: u32,
}

impl EmbeddingGenerationJob {
    pub fn new(
        asset_id: impl Into<String>,
        user_id: impl Into<String>,
        extracted_text: impl Into<String>,
    ) -> Self {
        let asset_id = asset_id.into();
        Self {
            id: format!("embedding_generation_{asset_id}"),
            asset_id,
            user_id: user_id.into(),
            extracted_text: extracted_text.into(),
            timestamp: Utc::now(),
            attempts: 0,
        }
    }
}

impl Envelope for EmbeddingGenerationJob {
    fn envelope_id(&self) -> &str {
        &self.id
    }
}

impl JobEnvelope for EmbeddingGenerationJob {
    fn attempts(&self) -> u32 {
        self.attempts
    }

    fn with_attempt(&self) -> Self {
        Self {
            attempts: self.attempts.saturating_add(1),
            ..self.clone()
        }
    }
}

/// Analyze a set of documents against a user query
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DocumentAnalysisJob {
    pub id: String,
    pub user_id: String,
    pub query: String,
    pub asset_ids: Vec<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub attempts: u32,
}

impl DocumentAnalysisJob {
    pub fn new(user_id: impl Into<String>, query: impl Into<String>, asset_ids: Vec<String>) -> Self {
        let user_id = user_id.into();
        let timestamp = Utc::now();
        Self {
            id: format!("document_analysis_{user_id}_{}", timestamp.timestamp_millis()),
            user_id,
            query: query.into(),
            asset_ids,
            timestamp,
            attempts: 0,
        }
    }
}

impl Envelope for DocumentAnalysisJob {
    fn envelope_id(&self) -> &str {
        &self.id
    }
}

impl JobEnvelope for DocumentAnalysisJob {
    fn attempts(&self) -> u32 {
        self.attempts
    }

    fn with_attempt(&self) -> Self {
        Self {
            attempts: self.attempts.saturating_add(1),
            ..self.clone()
        }
    }
}

/// User-facing event fanned out to the notification queue.
///
/// Publish-only from this crate's perspective; there is no retry semantics,
/// so it implements only [`Envelope`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    #[serde(default)]
    pub data: serde_json::Map<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        user_id: impl Into<String>,
        kind: impl Into<String>,
        message: impl Into<String>,
        data: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        let user_id = user_id.into();
        let timestamp = Utc::now();
        Self {
            id: format!("notification_{user_id}_{}", timestamp.timestamp_millis()),
            user_id,
            kind: kind.into(),
            message: message.into(),
            data,
            timestamp,
        }
    }
}

impl Envelope for Notification {
    fn envelope_id(&self) -> &str {
        &self.id
    }
}

/// How a one-time password reaches the user
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ContactMethod {
    Email,
    Phone,
}

/// A one-time password delivery request on the `otp-requests` queue
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OtpRequest {
    pub contact_method: ContactMethod,
    pub contact: String,
    pub otp: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_extraction_job_id_and_wire_format() {
        let job = TextExtractionJob::new("asset-42", "user-1", "/uploads/a.pdf", "pdf");
        assert_eq!(job.id, "text_extraction_asset-42");
        assert_eq!(job.envelope_id(), "text_extraction_asset-42");

        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["assetId"], "asset-42");
        assert_eq!(json["userId"], "user-1");
        assert_eq!(json["filePath"], "/uploads/a.pdf");
        assert_eq!(json["fileType"], "pdf");
        assert_eq!(json["attempts"], 0);
    }

    #[test]
    fn test_attempts_defaults_to_zero_when_absent() {
        let json = r#"{
            "id": "text_extraction_asset-42",
            "assetId": "asset-42",
            "userId": "user-1",
            "filePath": "/uploads/a.pdf",
            "fileType": "pdf",
            "timestamp": "2026-01-15T10:00:00Z"
        }"#;

        let job: TextExtractionJob = serde_json::from_str(json).unwrap();
        assert_eq!(job.attempts, 0);
    }

    #[test]
    fn test_with_attempt_increments_and_keeps_id() {
        let job = EmbeddingGenerationJob::new("asset-7", "user-1", "extracted text");
        let retry = job.with_attempt();
        assert_eq!(retry.attempts, 1);
        assert_eq!(retry.id, job.id);
        assert_eq!(retry.extracted_text, job.extracted_text);
    }

    #[test]
    fn test_with_attempt_saturates_at_the_counter_ceiling() {
        let mut job = TextExtractionJob::new("asset-42", "user-1", "/uploads/a.pdf", "pdf");
        job.attempts = u32::MAX;

        let retry = job.with_attempt();
        assert_eq!(retry.attempts, u32::MAX);
    }

    #[test]
    fn test_document_analysis_id_embeds_user_and_millis() {
        let job = DocumentAnalysisJob::new(
            "user-9",
            "summarize quarterly reports",
            vec!["a1".to_string(), "a2".to_string()],
        );
        assert!(job.id.starts_with("document_analysis_user-9_"));
        assert_eq!(job.asset_ids.len(), 2);
    }

    #[test]
    fn test_notification_type_field_name() {
        let notification = Notification::new(
            "user-1",
            "processing_complete",
            "Your document is ready",
            serde_json::Map::new(),
        );

        let json = serde_json::to_value(&notification).unwrap();
        assert_eq!(json["type"], "processing_complete");
        assert_eq!(json["userId"], "user-1");
        assert!(json.get("kind").is_none());
    }

    #[test]
    fn test_otp_request_round_trip() {
        let json = r#"{"contactMethod":"email","contact":"user@example.com","otp":"123456"}"#;
        let request: OtpRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.contact_method, ContactMethod::Email);
        assert_eq!(request.contact, "user@example.com");
        assert_eq!(request.otp, "123456");

        let phone = OtpRequest {
            contact_method: ContactMethod::Phone,
            contact: "+15551234567".to_string(),
            otp: "654321".to_string(),
        };
        let value = serde_json::to_value(&phone).unwrap();
        assert_eq!(value["contactMethod"], "phone");
    }
}
