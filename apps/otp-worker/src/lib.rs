//! OTP delivery worker.
//!
//! Deliberately simpler than the pipeline consumers: one durable queue, no
//! dead-lettering and no retry budget. A message is acknowledged only after
//! its transport dispatch succeeds; on failure it stays unacknowledged and
//! the broker redelivers it after reconnect.

pub mod transport;

use core_config::broker::BrokerConfig;
use core_config::{env_required, Environment, FromEnv};
use domain_jobs::{queues, OtpRequest};
use futures::StreamExt;
use lapin::options::{BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::{Connection, ConnectionProperties};
use tracing::{error, info, warn};
use transport::{HttpSmsOtpTransport, OtpRouter, OtpTransport, SmtpConfig, SmtpOtpTransport};

pub async fn run() -> eyre::Result<()> {
    core_config::tracing::install_color_eyre();
    let environment = Environment::from_env();
    core_config::tracing::init_tracing(&environment);

    let broker = BrokerConfig::from_env()?;

    let email = SmtpOtpTransport::new(SmtpConfig::from_env())?;
    let sms = HttpSmsOtpTransport::new(
        env_required("SMS_GATEWAY_URL")?,
        env_required("SMS_GATEWAY_API_KEY")?,
    );
    let router = OtpRouter::new(Box::new(email), Box::new(sms));

    run_with_transport(&broker.url, &router).await
}

/// Consume `otp-requests` until ctrl-c, delivering each request through the
/// given transport
pub async fn run_with_transport(url: &str, transport: &dyn OtpTransport) -> eyre::Result<()> {
    let connection = Connection::connect(url, ConnectionProperties::default()).await?;
    let channel = connection.create_channel().await?;

    channel
        .queue_declare(
            queues::OTP_REQUESTS,
            QueueDeclareOptions {
                durable: true,
                ..QueueDeclareOptions::default()
            },
            FieldTable::default(),
        )
        .await?;
    channel.basic_qos(1, BasicQosOptions::default()).await?;

    let mut deliveries = channel
        .basic_consume(
            queues::OTP_REQUESTS,
            "otp-worker",
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await?;

    info!(queue = queues::OTP_REQUESTS, "OTP worker started");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
            delivery = deliveries.next() => {
                let Some(delivery) = delivery else {
                    warn!("Delivery stream ended");
                    break;
                };
                let delivery = delivery?;

                let request: OtpRequest = match serde_json::from_slice(&delivery.data) {
                    Ok(request) => request,
                    Err(e) => {
                        // Malformed requests can never be delivered
                        error!(error = %e, "Unparseable OTP request, discarding");
                        delivery
                            .nack(BasicNackOptions {
                                requeue: false,
                                ..BasicNackOptions::default()
                            })
                            .await?;
                        continue;
                    }
                };

                match transport.deliver(&request).await {
                    Ok(()) => {
                        delivery.ack(BasicAckOptions::default()).await?;
                    }
                    Err(e) => {
                        // No ack: the broker redelivers after reconnect
                        error!(
                            contact = %request.contact,
                            error = %e,
                            "OTP delivery failed, leaving message unacknowledged"
                        );
                    }
                }
            }
        }
    }

    channel.close(200, "shutdown").await?;
    connection.close(200, "shutdown").await?;
    info!("OTP worker stopped");
    Ok(())
}
