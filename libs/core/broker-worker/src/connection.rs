//! Broker connection lifecycle.
//!
//! One connection and one multiplexed channel per process, owned by an
//! explicit `BrokerClient` created at the composition root and shared by
//! publisher, consumers and admin. Mid-run connection loss is handled by an
//! explicit reconnect state machine (disconnected -> connecting -> connected)
//! with bounded exponential backoff; the topology is re-declared on every
//! successful dial before the client reports itself connected.

use crate::config::TopologyConfig;
use crate::error::BrokerError;
use crate::topology::setup_topology;
use lapin::options::ConfirmSelectOptions;
use lapin::{Channel, Connection, ConnectionProperties};
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, error, info, warn};

const MAX_RECONNECT_ATTEMPTS: u32 = 10;
const MAX_RECONNECT_BACKOFF: Duration = Duration::from_secs(30);

/// Connection lifecycle state, observable through a watch channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Options applied when dialing the broker
#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    /// Put the channel in confirm mode and wait for broker-side acks on
    /// publish (off by default, matching fire-and-forget publishing)
    pub publisher_confirms: bool,
}

struct Inner {
    connection: Connection,
    channel: Channel,
}

/// Owns the process-wide broker connection and channel
pub struct BrokerClient {
    url: String,
    options: ConnectOptions,
    topology: TopologyConfig,
    inner: RwLock<Option<Inner>>,
    state_tx: watch::Sender<ConnectionState>,
    // Serializes reconnect attempts from concurrent consumers
    reconnect_lock: Mutex<()>,
}

impl BrokerClient {
    /// Connect, open the channel and declare the topology.
    ///
    /// Fails with `BrokerError::Connection` when the broker is unreachable -
    /// callers treat this as fatal at startup - or with
    /// `BrokerError::TopologyConflict` when an existing queue was declared
    /// with different arguments.
    pub async fn connect(
        url: impl Into<String>,
        topology: TopologyConfig,
        options: ConnectOptions,
    ) -> Result<Self, BrokerError> {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let client = Self {
            url: url.into(),
            options,
            topology,
            inner: RwLock::new(None),
            state_tx,
            reconnect_lock: Mutex::new(()),
        };
        client.dial().await?;
        Ok(client)
    }

    async fn dial(&self) -> Result<(), BrokerError> {
        self.state_tx.send_replace(ConnectionState::Connecting);

        let connection = Connection::connect(&self.url, ConnectionProperties::default())
            .await
            .map_err(|e| {
                self.state_tx.send_replace(ConnectionState::Disconnected);
                BrokerError::Connection(e.to_string())
            })?;

        // Surface connection-level errors as an observable state change;
        // consumers pick this up and drive the reconnect
        let state_tx = self.state_tx.clone();
        connection.on_error(move |err| {
            error!(error = %err, "Broker connection error");
            let _ = state_tx.send(ConnectionState::Disconnected);
        });

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;

        if self.options.publisher_confirms {
            channel
                .confirm_select(ConfirmSelectOptions::default())
                .await
                .map_err(|e| BrokerError::Connection(e.to_string()))?;
        }

        setup_topology(&channel, &self.topology).await?;

        *self.inner.write().await = Some(Inner { connection, channel });
        self.state_tx.send_replace(ConnectionState::Connected);
        info!(url = %self.url, "Broker connected and configured");
        Ok(())
    }

    /// Clone of the shared channel, or a connection error when disconnected
    pub async fn channel(&self) -> Result<Channel, BrokerError> {
        self.inner
            .read()
            .await
            .as_ref()
            .map(|inner| inner.channel.clone())
            .ok_or_else(|| BrokerError::Connection("not connected".to_string()))
    }

    /// Subscribe to connection lifecycle changes
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub async fn is_connected(&self) -> bool {
        match &*self.inner.read().await {
            Some(inner) => {
                inner.connection.status().connected() && inner.channel.status().connected()
            }
            None => false,
        }
    }

    pub fn topology(&self) -> &TopologyConfig {
        &self.topology
    }

    pub fn publisher_confirms(&self) -> bool {
        self.options.publisher_confirms
    }

    /// Re-establish the connection if it is down.
    ///
    /// Runs a bounded exponential backoff loop (1s doubling, capped at 30s)
    /// and re-declares the topology before reporting success. Concurrent
    /// callers are serialized; whoever arrives second sees the restored
    /// connection and returns immediately.
    pub async fn ensure_connected(&self) -> Result<(), BrokerError> {
        let _guard = self.reconnect_lock.lock().await;

        if self.is_connected().await {
            return Ok(());
        }

        let mut attempt: u32 = 0;
        loop {
            match self.dial().await {
                Ok(()) => {
                    if attempt > 0 {
                        info!(attempts = attempt + 1, "Broker reconnected");
                    }
                    return Ok(());
                }
                Err(e) if e.is_topology_conflict() => return Err(e),
                Err(e) => {
                    attempt += 1;
                    if attempt >= MAX_RECONNECT_ATTEMPTS {
                        error!(error = %e, attempts = attempt, "Giving up on broker reconnect");
                        return Err(e);
                    }
                    let backoff = reconnect_backoff(attempt);
                    warn!(
                        error = %e,
                        attempt = attempt,
                        backoff_secs = backoff.as_secs(),
                        "Broker unreachable, backing off"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    /// A client with no live connection, for exercising disconnected paths
    #[cfg(test)]
    pub(crate) fn disconnected(topology: TopologyConfig) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            url: "amqp://localhost:5672".to_string(),
            options: ConnectOptions::default(),
            topology,
            inner: RwLock::new(None),
            state_tx,
            reconnect_lock: Mutex::new(()),
        }
    }

    /// Close channel then connection. Idempotent; close-time errors are
    /// swallowed and logged at debug level.
    pub async fn disconnect(&self) {
        if let Some(inner) = self.inner.write().await.take() {
            if let Err(e) = inner.channel.close(200, "shutdown").await {
                debug!(error = %e, "Error closing channel");
            }
            if let Err(e) = inner.connection.close(200, "shutdown").await {
                debug!(error = %e, "Error closing connection");
            }
        }
        self.state_tx.send_replace(ConnectionState::Disconnected);
        info!("Broker disconnected");
    }
}

/// Exponential backoff for reconnect attempt n: 1s, 2s, 4s, ... capped at 30s
fn reconnect_backoff(attempt: u32) -> Duration {
    let secs = 1u64 << attempt.min(6).saturating_sub(1);
    Duration::from_secs(secs).min(MAX_RECONNECT_BACKOFF)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconnect_backoff_doubles_and_caps() {
        assert_eq!(reconnect_backoff(1), Duration::from_secs(1));
        assert_eq!(reconnect_backoff(2), Duration::from_secs(2));
        assert_eq!(reconnect_backoff(3), Duration::from_secs(4));
        assert_eq!(reconnect_backoff(5), Duration::from_secs(16));
        // Bounded: never exceeds the cap
        assert_eq!(reconnect_backoff(6), Duration::from_secs(30));
        assert_eq!(reconnect_backoff(100), Duration::from_secs(30));
        assert!(reconnect_backoff(100) <= MAX_RECONNECT_BACKOFF);
    }

    #[test]
    fn test_connect_options_default_is_fire_and_forget() {
        let options = ConnectOptions::default();
        assert!(!options.publisher_confirms);
    }
}
