//! OTP delivery transports.
//!
//! Email goes out over SMTP; phone numbers go to an HTTP SMS gateway. The
//! router picks the transport from the request's contact method.

use async_trait::async_trait;
use domain_jobs::{ContactMethod, OtpRequest};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("SMTP error: {0}")]
    Smtp(String),

    #[error("SMS gateway error: {0}")]
    SmsGateway(String),
}

/// Delivers a one-time password to its contact
#[async_trait]
pub trait OtpTransport: Send + Sync {
    async fn deliver(&self, request: &OtpRequest) -> Result<(), TransportError>;
}

/// SMTP configuration for OTP emails
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub from_email: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub use_tls: bool,
}

impl SmtpConfig {
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("SMTP_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("SMTP_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1025),
            from_email: std::env::var("SMTP_FROM_EMAIL")
                .unwrap_or_else(|_| "noreply@localhost".to_string()),
            username: std::env::var("SMTP_USERNAME").ok(),
            password: std::env::var("SMTP_PASSWORD").ok(),
            use_tls: std::env::var("SMTP_USE_TLS")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        }
    }
}

/// Sends OTP emails through lettre
pub struct SmtpOtpTransport {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_email: String,
}

impl SmtpOtpTransport {
    pub fn new(config: SmtpConfig) -> Result<Self, TransportError> {
        let transport = if config.use_tls {
            let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| TransportError::Smtp(format!("Failed to create SMTP relay: {e}")))?
                .port(config.port);
            if let (Some(username), Some(password)) = (&config.username, &config.password) {
                builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
            }
            builder.build()
        } else {
            // Plaintext transport for local dev servers like Mailpit
            let mut builder =
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
                    .port(config.port);
            if let (Some(username), Some(password)) = (&config.username, &config.password) {
                builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
            }
            builder.build()
        };

        Ok(Self {
            transport,
            from_email: config.from_email,
        })
    }
}

#[async_trait]
impl OtpTransport for SmtpOtpTransport {
    async fn deliver(&self, request: &OtpRequest) -> Result<(), TransportError> {
        let message = Message::builder()
            .from(
                self.from_email
                    .parse()
                    .map_err(|e| TransportError::InvalidAddress(format!("{e}")))?,
            )
            .to(request
                .contact
                .parse()
                .map_err(|e| TransportError::InvalidAddress(format!("{e}")))?)
            .subject("Your verification code")
            .body(format!(
                "Your verification code is {}. It expires in 10 minutes.",
                request.otp
            ))
            .map_err(|e| TransportError::Smtp(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| TransportError::Smtp(e.to_string()))?;

        info!(contact = %request.contact, "OTP email sent");
        Ok(())
    }
}

/// Sends OTP texts through an HTTP SMS gateway
pub struct HttpSmsOtpTransport {
    client: reqwest::Client,
    gateway_url: String,
    api_key: String,
}

impl HttpSmsOtpTransport {
    pub fn new(gateway_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            gateway_url: gateway_url.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl OtpTransport for HttpSmsOtpTransport {
    async fn deliver(&self, request: &OtpRequest) -> Result<(), TransportError> {
        let body = serde_json::json!({
            "to": request.contact,
            "message": format!("Your verification code is {}", request.otp),
        });

        debug!(contact = %request.contact, "Dispatching OTP to SMS gateway");
        let response = self
            .client
            .post(&self.gateway_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| TransportError::SmsGateway(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TransportError::SmsGateway(format!(
                "gateway returned {}",
                response.status()
            )));
        }

        info!(contact = %request.contact, "OTP SMS sent");
        Ok(())
    }
}

/// Routes each request to the transport matching its contact method
pub struct OtpRouter {
    email: Box<dyn OtpTransport>,
    sms: Box<dyn OtpTransport>,
}

impl OtpRouter {
    pub fn new(email: Box<dyn OtpTransport>, sms: Box<dyn OtpTransport>) -> Self {
        Self { email, sms }
    }
}

#[async_trait]
impl OtpTransport for OtpRouter {
    async fn deliver(&self, request: &OtpRequest) -> Result<(), TransportError> {
        match request.contact_method {
            ContactMethod::Email => self.email.deliver(request).await,
            ContactMethod::Phone => self.sms.deliver(request).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingTransport {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl OtpTransport for CountingTransport {
        async fn deliver(&self, _request: &OtpRequest) -> Result<(), TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_router_picks_transport_by_contact_method() {
        let email_calls = Arc::new(AtomicUsize::new(0));
        let sms_calls = Arc::new(AtomicUsize::new(0));
        let router = OtpRouter::new(
            Box::new(CountingTransport {
                calls: Arc::clone(&email_calls),
            }),
            Box::new(CountingTransport {
                calls: Arc::clone(&sms_calls),
            }),
        );

        let email_request = OtpRequest {
            contact_method: ContactMethod::Email,
            contact: "user@example.com".to_string(),
            otp: "123456".to_string(),
        };
        let phone_request = OtpRequest {
            contact_method: ContactMethod::Phone,
            contact: "+15551234567".to_string(),
            otp: "654321".to_string(),
        };

        router.deliver(&email_request).await.unwrap();
        router.deliver(&phone_request).await.unwrap();
        router.deliver(&phone_request).await.unwrap();

        assert_eq!(email_calls.load(Ordering::SeqCst), 1);
        assert_eq!(sms_calls.load(Ordering::SeqCst), 2);
    }
}
