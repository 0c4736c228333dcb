use crate::{env_flag, env_or_default, ConfigError, FromEnv};

/// Message broker (AMQP) configuration
#[derive(Clone, Debug)]
pub struct BrokerConfig {
    /// Broker connection URL (amqp://...)
    pub url: String,

    /// Wait for broker-side publisher confirms on every publish.
    ///
    /// Off by default: publishes then only report local buffer acceptance,
    /// so a message can be lost if the broker dies before persisting it.
    pub publisher_confirms: bool,
}

impl BrokerConfig {
    pub fn new(url: String) -> Self {
        Self {
            url,
            publisher_confirms: false,
        }
    }

    pub fn with_publisher_confirms(mut self, enabled: bool) -> Self {
        self.publisher_confirms = enabled;
        self
    }
}

impl FromEnv for BrokerConfig {
    /// Reads RABBITMQ_URL (default: local broker on the standard AMQP port)
    /// and RABBITMQ_PUBLISHER_CONFIRMS (default: off).
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            url: env_or_default("RABBITMQ_URL", "amqp://localhost:5672"),
            publisher_confirms: env_flag("RABBITMQ_PUBLISHER_CONFIRMS", false),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broker_config_default_url() {
        temp_env::with_vars_unset(["RABBITMQ_URL", "RABBITMQ_PUBLISHER_CONFIRMS"], || {
            let config = BrokerConfig::from_env().unwrap();
            assert_eq!(config.url, "amqp://localhost:5672");
            assert!(!config.publisher_confirms);
        });
    }

    #[test]
    fn test_broker_config_from_env() {
        temp_env::with_vars(
            [
                ("RABBITMQ_URL", Some("amqp://broker:5672/%2f")),
                ("RABBITMQ_PUBLISHER_CONFIRMS", Some("true")),
            ],
            || {
                let config = BrokerConfig::from_env().unwrap();
                assert_eq!(config.url, "amqp://broker:5672/%2f");
                assert!(config.publisher_confirms);
            },
        );
    }

    #[test]
    fn test_broker_config_builder() {
        let config =
            BrokerConfig::new("amqp://prod-broker:5672".to_string()).with_publisher_confirms(true);
        assert_eq!(config.url, "amqp://prod-broker:5672");
        assert!(config.publisher_confirms);
    }
}
