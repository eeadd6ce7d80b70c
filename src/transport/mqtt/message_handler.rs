//! Pure message routing for MQTT session events
//!
//! This module contains pure functions deciding what each event loop event
//! means for the session connection.

use crate::protocol::InboundFeedback;
use bytes::Bytes;
use rumqttc::v5::Event;
use tracing::debug;

/// Routing decision for one event loop event
#[derive(Debug, Clone, PartialEq)]
pub enum EventRoute {
    ConnectionAcknowledged,
    MessageReceived {
        topic: String,
        payload: Bytes,
        retain: bool,
    },
    Disconnected,
    SubscriptionConfirmed,
    InfrastructureEvent(String),
    OutgoingEvent,
}

/// Pure message routing decisions based on MQTT events
pub struct MessageHandler;

impl MessageHandler {
    /// Route MQTT event to appropriate handler (pure routing decision)
    pub fn route_mqtt_event(event: &Event) -> EventRoute {
        match event {
            Event::Incoming(incoming) => {
                use rumqttc::v5::mqttbytes::v5::Packet;
                match incoming {
                    Packet::ConnAck(_) => EventRoute::ConnectionAcknowledged,
                    Packet::Publish(publish) => EventRoute::MessageReceived {
                        topic: String::from_utf8_lossy(&publish.topic).to_string(),
                        payload: publish.payload.clone(),
                        retain: publish.retain,
                    },
                    Packet::Disconnect(_) => EventRoute::Disconnected,
                    Packet::SubAck(_) => EventRoute::SubscriptionConfirmed,
                    other => EventRoute::InfrastructureEvent(format!("{other:?}")),
                }
            }
            Event::Outgoing(_) => EventRoute::OutgoingEvent,
        }
    }

    /// Determine if a publish is a reply for this session (pure function)
    pub fn should_process_message(topic: &str, retain: bool, expected_topic: &str) -> bool {
        // Stale replies from a previous exchange must not answer a new request
        if retain {
            debug!("Ignoring retained message on topic: {}", topic);
            return false;
        }

        if topic != expected_topic {
            debug!("Topic mismatch: expected {}, got {}", expected_topic, topic);
            return false;
        }

        true
    }

    /// Parse a reply payload (pure function)
    pub fn parse_feedback(payload: &[u8]) -> Result<InboundFeedback, String> {
        InboundFeedback::from_slice(payload)
    }
}
