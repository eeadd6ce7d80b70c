//! Pure connection state management for the MQTT session connection
//!
//! This module contains pure functions for connection state management and
//! broker option handling.

use crate::config::SessionSection;
use crate::transport::TransportError;
use rumqttc::v5::MqttOptions;
use rumqttc::Transport as RumqttcTransport;
use std::time::Duration;
use url::Url;

/// Connection state for the MQTT session connection
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    /// Initial state - attempting to connect
    Connecting,
    /// Successfully connected and ready for operations
    Connected,
    /// Disconnected with reason
    Disconnected(String),
    /// Connected, but replies cannot arrive because the feedback subscription
    /// was not accepted
    SubscriptionFailed(String),
    /// Shut down locally; no further events will be processed
    Closed,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

/// How long to wait for the broker's ConnAck
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Delay before polling the event loop again after a network error
pub const ERROR_POLL_DELAY: Duration = Duration::from_millis(250);

/// Build a unique client id for a session connection (pure function)
pub fn build_client_id(room: &str) -> String {
    format!("agent-tools-{room}-{}", uuid::Uuid::new_v4().simple())
}

/// Pure function to configure MQTT options from config
pub fn configure_mqtt_options(
    client_id: &str,
    config: &SessionSection,
) -> Result<MqttOptions, TransportError> {
    let url = Url::parse(&config.broker_url)
        .map_err(|_| TransportError::InvalidBrokerUrl(config.broker_url.clone()))?;

    let host = url
        .host_str()
        .ok_or_else(|| TransportError::InvalidBrokerUrl(config.broker_url.clone()))?;
    let port = url
        .port()
        .unwrap_or(if url.scheme() == "mqtts" { 8883 } else { 1883 });

    let mut mqtt_options = MqttOptions::new(client_id, host, port);

    if url.scheme() == "mqtts" {
        let transport = RumqttcTransport::tls_with_default_config();
        mqtt_options.set_transport(transport);
    }

    if let Some(username) = config.username() {
        let password = config.password().unwrap_or_default();
        mqtt_options.set_credentials(&username, &password);
    }

    mqtt_options.set_keep_alive(Duration::from_secs(60));
    mqtt_options.set_max_packet_size(Some(256 * 1024));

    Ok(mqtt_options)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_session_config() -> SessionSection {
        SessionSection {
            broker_url: "mqtt://localhost:1883".to_string(),
            session_id: Some("room-1".to_string()),
            username_env: None,
            password_env: None,
            receive_timeout_secs: 5,
        }
    }

    #[test]
    fn test_configure_mqtt_options() {
        let config = test_session_config();
        let options = configure_mqtt_options("client-1", &config);
        assert!(options.is_ok());
    }

    #[test]
    fn test_invalid_broker_url() {
        let mut config = test_session_config();
        config.broker_url = "invalid-url".to_string();

        let result = configure_mqtt_options("client-1", &config);
        assert!(matches!(result, Err(TransportError::InvalidBrokerUrl(_))));
    }

    #[test]
    fn test_client_ids_are_unique_per_connection() {
        let a = build_client_id("room-1");
        let b = build_client_id("room-1");
        assert!(a.starts_with("agent-tools-room-1-"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_connection_state() {
        assert!(ConnectionState::Connected.is_connected());
        assert!(!ConnectionState::Connecting.is_connected());
        assert!(!ConnectionState::Closed.is_connected());
        assert!(!ConnectionState::SubscriptionFailed("queue full".to_string()).is_connected());
        assert_ne!(
            ConnectionState::Connected,
            ConnectionState::Disconnected("test".to_string())
        );
    }
}
