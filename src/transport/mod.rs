//! Session transport layer
//!
//! This module provides the connection abstraction tools use to talk to a
//! human participant, and an MQTT implementation of it.

use crate::protocol::{DeliveryMode, InboundFeedback, SocketEvent};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

pub mod mqtt;

/// Persistent bidirectional connection to a session
///
/// Implementations serialise their own send and receive operations. Callers
/// keep at most one outstanding receive per connection.
#[async_trait::async_trait]
pub trait SessionConnection: Send + Sync {
    /// Publish an event to `room` using the given delivery mode
    async fn emit(
        &self,
        room: &str,
        event: SocketEvent,
        payload: &Value,
        mode: DeliveryMode,
    ) -> Result<(), TransportError>;

    /// Wait for the next reply, bounded by the connection's configured timeout
    async fn receive(&self) -> Result<InboundFeedback, TransportError>;

    /// Check if the connection is currently usable
    fn is_connected(&self) -> bool;
}

/// Serialize `message` and emit it to `room`
pub async fn send<T: Serialize + Sync>(
    connection: &dyn SessionConnection,
    room: &str,
    event: SocketEvent,
    message: &T,
    mode: DeliveryMode,
) -> Result<(), TransportError> {
    let payload = serde_json::to_value(message).map_err(TransportError::Serialization)?;
    connection.emit(room, event, &payload, mode).await
}

/// Session transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Timed out after {0:?} waiting on the session")]
    Timeout(std::time::Duration),
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Publishing failed")]
    PublishFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Subscription failed")]
    SubscriptionFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Serialization error")]
    Serialization(#[source] serde_json::Error),
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("Invalid session: {0}")]
    InvalidSession(#[from] crate::protocol::ValidationError),
    #[error("Not connected - current state: {state:?}")]
    NotConnected { state: mqtt::ConnectionState },
    #[error("Connection closed")]
    Closed,
}

impl TransportError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout(_))
    }
}
