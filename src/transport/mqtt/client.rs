//! Impure I/O operations for the MQTT session connection
//!
//! This module handles network communication and async coordination with the
//! rumqttc client. Routing decisions live in [`super::message_handler`].

use super::connection::{
    build_client_id, configure_mqtt_options, ConnectionState, CONNECT_TIMEOUT, ERROR_POLL_DELAY,
};
use super::message_handler::{EventRoute, MessageHandler};
use crate::config::SessionSection;
use crate::protocol::{
    validate_session_id, DeliveryMode, InboundFeedback, SessionTopics, SocketEvent,
};
use crate::transport::{SessionConnection, TransportError};
use async_trait::async_trait;
use rumqttc::v5::mqttbytes::v5::PublishProperties;
use rumqttc::v5::{mqttbytes::QoS, AsyncClient, EventLoop};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const FEEDBACK_BUFFER: usize = 16;

/// Session connection over an MQTT broker
///
/// Publishes events to the room's broadcast and direct topics and reads human
/// replies from the room's feedback topic.
pub struct MqttSessionConnection {
    room: String,
    client: AsyncClient,
    receive_timeout: Duration,
    feedback_rx: Mutex<mpsc::Receiver<InboundFeedback>>,
    state_rx: watch::Receiver<ConnectionState>,
    shutdown_tx: watch::Sender<bool>,
    event_loop_handle: Mutex<Option<JoinHandle<()>>>,
}

impl MqttSessionConnection {
    /// Connect to the broker and join `room`
    ///
    /// Returns only after the broker acknowledged the connection.
    pub async fn connect(config: &SessionSection, room: &str) -> Result<Self, TransportError> {
        validate_session_id(room)?;

        let client_id = build_client_id(room);
        let mqtt_options = configure_mqtt_options(&client_id, config)?;
        let (client, event_loop) = AsyncClient::new(mqtt_options, 10);

        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (feedback_tx, feedback_rx) = mpsc::channel(FEEDBACK_BUFFER);

        info!(
            room = %room,
            broker = %config.broker_url,
            "Connecting session transport"
        );

        let handle = tokio::spawn(Self::run_event_loop(
            event_loop,
            client.clone(),
            SessionTopics::feedback(room),
            state_tx,
            feedback_tx,
            shutdown_rx,
        ));

        if let Err(e) = Self::wait_for_connection_confirmation(state_rx.clone(), CONNECT_TIMEOUT).await
        {
            let _ = shutdown_tx.send(true);
            handle.abort();
            return Err(e);
        }

        info!(room = %room, "Session transport connected");

        Ok(Self {
            room: room.to_string(),
            client,
            receive_timeout: Duration::from_secs(config.receive_timeout_secs),
            feedback_rx: Mutex::new(feedback_rx),
            state_rx,
            shutdown_tx,
            event_loop_handle: Mutex::new(Some(handle)),
        })
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state_rx.borrow().clone()
    }

    /// Disconnect from the broker and stop the event loop
    pub async fn disconnect(&self) -> Result<(), TransportError> {
        if let Err(e) = self.client.disconnect().await {
            debug!("Disconnect request not delivered: {}", e);
        }
        let _ = self.shutdown_tx.send(true);

        if let Some(handle) = self.event_loop_handle.lock().await.take() {
            if let Err(e) = handle.await {
                warn!("Session event loop task failed: {}", e);
            }
        }

        info!(room = %self.room, "Session transport disconnected");
        Ok(())
    }

    async fn wait_for_connection_confirmation(
        mut state_rx: watch::Receiver<ConnectionState>,
        timeout: Duration,
    ) -> Result<(), TransportError> {
        let result = tokio::time::timeout(timeout, async {
            loop {
                let state = state_rx.borrow().clone();
                match state {
                    ConnectionState::Connected => return Ok(()),
                    ConnectionState::SubscriptionFailed(reason) => {
                        return Err(TransportError::SubscriptionFailed(reason.into()));
                    }
                    _ => {}
                }
                if state_rx.changed().await.is_err() {
                    return Err(TransportError::ConnectionFailed(
                        "State channel closed".to_string(),
                    ));
                }
            }
        })
        .await;

        match result {
            Ok(inner) => inner,
            Err(_) => {
                let last_state = state_rx.borrow().clone();
                Err(TransportError::ConnectionFailed(format!(
                    "ConnAck timeout - last state: {last_state:?}"
                )))
            }
        }
    }

    async fn run_event_loop(
        mut event_loop: EventLoop,
        client: AsyncClient,
        feedback_topic: String,
        state_tx: watch::Sender<ConnectionState>,
        feedback_tx: mpsc::Sender<InboundFeedback>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
                event_result = event_loop.poll() => {
                    match event_result {
                        Ok(event) => {
                            let route = MessageHandler::route_mqtt_event(&event);
                            if !Self::process_event_route(
                                route,
                                &client,
                                &feedback_topic,
                                &state_tx,
                                &feedback_tx,
                            ) {
                                break;
                            }
                        }
                        Err(e) => {
                            warn!("Session transport error: {}", e);
                            let _ = state_tx.send(ConnectionState::Disconnected(e.to_string()));
                            // rumqttc reconnects on the next poll
                            tokio::time::sleep(ERROR_POLL_DELAY).await;
                        }
                    }
                }
            }
        }

        let _ = state_tx.send(ConnectionState::Closed);
        debug!(topic = %feedback_topic, "Session event loop stopped");
    }

    /// Returns true to continue the loop, false to stop it
    fn process_event_route(
        route: EventRoute,
        client: &AsyncClient,
        feedback_topic: &str,
        state_tx: &watch::Sender<ConnectionState>,
        feedback_tx: &mpsc::Sender<InboundFeedback>,
    ) -> bool {
        match route {
            EventRoute::ConnectionAcknowledged => {
                // Subscribe on every ConnAck: clean sessions drop subscriptions
                let state = match client.try_subscribe(feedback_topic, QoS::AtLeastOnce) {
                    Ok(()) => ConnectionState::Connected,
                    Err(e) => {
                        error!("Failed to subscribe to {}: {}", feedback_topic, e);
                        ConnectionState::SubscriptionFailed(e.to_string())
                    }
                };
                let _ = state_tx.send(state);
                true
            }
            EventRoute::MessageReceived {
                topic,
                payload,
                retain,
            } => {
                if !MessageHandler::should_process_message(&topic, retain, feedback_topic) {
                    return true;
                }
                match MessageHandler::parse_feedback(&payload) {
                    Ok(feedback) => match feedback_tx.try_send(feedback) {
                        Ok(()) => true,
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            warn!("Feedback buffer full, dropping reply on {}", topic);
                            true
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => false,
                    },
                    Err(e) => {
                        warn!("Ignoring malformed feedback on {}: {}", topic, e);
                        true
                    }
                }
            }
            EventRoute::Disconnected => {
                let _ = state_tx.send(ConnectionState::Disconnected(
                    "Disconnected by broker".to_string(),
                ));
                true
            }
            EventRoute::SubscriptionConfirmed => {
                debug!(topic = %feedback_topic, "Feedback subscription confirmed");
                true
            }
            EventRoute::InfrastructureEvent(event_str) => {
                tracing::trace!(target: "session_transport", "MQTT event: {}", event_str);
                true
            }
            EventRoute::OutgoingEvent => true,
        }
    }

    fn check_connection_state(&self) -> Result<(), TransportError> {
        let state = self.state_rx.borrow().clone();
        if state.is_connected() {
            Ok(())
        } else {
            Err(TransportError::NotConnected { state })
        }
    }
}

#[async_trait]
impl SessionConnection for MqttSessionConnection {
    async fn emit(
        &self,
        room: &str,
        event: SocketEvent,
        payload: &Value,
        mode: DeliveryMode,
    ) -> Result<(), TransportError> {
        validate_session_id(room)?;
        self.check_connection_state()?;

        let body = serde_json::to_vec(payload).map_err(TransportError::Serialization)?;

        let topics = SessionTopics::delivery(room, event.as_str(), mode);
        for (delivered, topic) in topics.iter().enumerate() {
            if let Err(e) = self
                .client
                .publish_with_properties(
                    topic,
                    QoS::AtLeastOnce,
                    false,
                    body.clone(),
                    PublishProperties::default(),
                )
                .await
            {
                error!(topic = %topic, event = %event, "Failed to publish session event: {}", e);
                if delivered > 0 {
                    warn!(
                        topic = %topic,
                        delivered = ?&topics[..delivered],
                        "Session event only partially delivered"
                    );
                }
                return Err(TransportError::PublishFailed(Box::new(e)));
            }
            debug!(topic = %topic, event = %event, "Published session event");
        }

        Ok(())
    }

    async fn receive(&self) -> Result<InboundFeedback, TransportError> {
        let mut feedback_rx = self.feedback_rx.lock().await;
        match tokio::time::timeout(self.receive_timeout, feedback_rx.recv()).await {
            Ok(Some(feedback)) => Ok(feedback),
            Ok(None) => Err(TransportError::Closed),
            Err(_) => Err(TransportError::Timeout(self.receive_timeout)),
        }
    }

    fn is_connected(&self) -> bool {
        self.state_rx.borrow().is_connected()
    }
}

impl Drop for MqttSessionConnection {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_config() -> SessionSection {
        SessionSection {
            // Port 1 is never an MQTT broker
            broker_url: "mqtt://127.0.0.1:1".to_string(),
            session_id: None,
            username_env: None,
            password_env: None,
            receive_timeout_secs: 1,
        }
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_room() {
        let result = MqttSessionConnection::connect(&unreachable_config(), "bad/room").await;
        assert!(matches!(result, Err(TransportError::InvalidSession(_))));
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_broker_url() {
        let mut config = unreachable_config();
        config.broker_url = "not a url".to_string();

        let result = MqttSessionConnection::connect(&config, "room-1").await;
        assert!(matches!(result, Err(TransportError::InvalidBrokerUrl(_))));
    }

    #[tokio::test]
    async fn test_wait_for_connection_times_out() {
        let (_state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let result = MqttSessionConnection::wait_for_connection_confirmation(
            state_rx,
            Duration::from_millis(20),
        )
        .await;
        assert!(matches!(result, Err(TransportError::ConnectionFailed(_))));
    }

    #[tokio::test]
    async fn test_wait_for_connection_succeeds_on_connack() {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let waiter = tokio::spawn(MqttSessionConnection::wait_for_connection_confirmation(
            state_rx,
            Duration::from_secs(1),
        ));
        state_tx.send(ConnectionState::Connected).unwrap();
        assert!(waiter.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_wait_for_connection_fails_without_subscription() {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let waiter = tokio::spawn(MqttSessionConnection::wait_for_connection_confirmation(
            state_rx,
            Duration::from_secs(1),
        ));
        state_tx
            .send(ConnectionState::SubscriptionFailed("queue closed".to_string()))
            .unwrap();
        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(TransportError::SubscriptionFailed(_))));
    }

    /// Client whose event loop is already gone, so every request fails
    fn detached_client() -> AsyncClient {
        let options = rumqttc::v5::MqttOptions::new("agent-tools-test", "localhost", 1883);
        let (client, event_loop) = AsyncClient::new(options, 10);
        drop(event_loop);
        client
    }

    #[test]
    fn test_rejected_subscription_is_not_reported_connected() {
        let client = detached_client();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let (feedback_tx, _feedback_rx) = mpsc::channel(1);

        let keep_running = MqttSessionConnection::process_event_route(
            EventRoute::ConnectionAcknowledged,
            &client,
            "/sessions/room-1/feedback",
            &state_tx,
            &feedback_tx,
        );

        assert!(keep_running);
        assert!(matches!(
            *state_rx.borrow(),
            ConnectionState::SubscriptionFailed(_)
        ));
    }

    #[tokio::test]
    async fn test_emit_reports_failed_publish() {
        let (_state_tx, state_rx) = watch::channel(ConnectionState::Connected);
        let (shutdown_tx, _shutdown_rx) = watch::channel(false);
        let (_feedback_tx, feedback_rx) = mpsc::channel(1);
        let connection = MqttSessionConnection {
            room: "room-1".to_string(),
            client: detached_client(),
            receive_timeout: Duration::from_secs(1),
            feedback_rx: Mutex::new(feedback_rx),
            state_rx,
            shutdown_tx,
            event_loop_handle: Mutex::new(None),
        };

        let result = connection
            .emit(
                "room-1",
                SocketEvent::Message,
                &serde_json::json!({"text": "hi"}),
                DeliveryMode::Both,
            )
            .await;

        assert!(matches!(result, Err(TransportError::PublishFailed(_))));
    }
}
