//! Session message types for human-in-the-loop exchanges
//!
//! This module defines the structures published to a session ("room") and the
//! reply shape read back from it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Author name stamped on every tool-originated message
pub const SYSTEM_AUTHOR: &str = "system";

/// Reply kind that requests an immediate stop of all work
pub const TERMINATE_KIND: &str = "terminate";

/// Events understood by the session peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SocketEvent {
    Message,
}

impl SocketEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            SocketEvent::Message => "message",
        }
    }
}

impl std::fmt::Display for SocketEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an emitted event is delivered to the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// Fan out to every participant of the room
    Broadcast,
    /// Deliver to the peer on the other end of this connection
    Direct,
    /// Broadcast and direct delivery
    Both,
}

impl DeliveryMode {
    pub fn includes_broadcast(&self) -> bool {
        matches!(self, DeliveryMode::Broadcast | DeliveryMode::Both)
    }

    pub fn includes_direct(&self) -> bool {
        matches!(self, DeliveryMode::Direct | DeliveryMode::Both)
    }
}

/// A single chunk of text shown to the human
///
/// # Examples
/// ```
/// use agent_tools::protocol::Message;
///
/// let message = Message::single_chunk(Some("Proceed?".to_string()));
/// assert!(message.first);
/// assert!(message.single);
/// assert_eq!(message.tokens, 1);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// UUID v4 chunk identifier
    pub chunk_id: String,
    pub text: Option<String>,
    pub first: bool,
    /// Placeholder token count; the renderer does not use it for segmentation
    pub tokens: u32,
    /// Epoch milliseconds
    pub timestamp: f64,
    pub single: bool,
}

impl Message {
    /// Build a complete, single-chunk message stamped with the current time
    pub fn single_chunk(text: Option<String>) -> Self {
        Self {
            chunk_id: Uuid::new_v4().to_string(),
            text,
            first: true,
            tokens: 1,
            timestamp: chrono::Utc::now().timestamp_millis() as f64,
            single: true,
        }
    }
}

/// Envelope routing a [`Message`] to a session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SocketMessage {
    pub room: String,
    pub author_name: String,
    pub message: Message,
    pub is_feedback: bool,
}

impl SocketMessage {
    /// Envelope asking the human in `room` for feedback
    pub fn feedback_request(room: &str, text: Option<String>) -> Self {
        Self {
            room: room.to_string(),
            author_name: SYSTEM_AUTHOR.to_string(),
            message: Message::single_chunk(text),
            is_feedback: true,
        }
    }
}

/// One-way error notification for a session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorNotice {
    pub room: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
}

impl ErrorNotice {
    pub fn new(room: &str, message: impl Into<String>) -> Self {
        Self {
            room: room.to_string(),
            kind: "error".to_string(),
            message: message.into(),
        }
    }

    /// Notice sent when no feedback arrived before the connection timed out
    pub fn timeout(room: &str) -> Self {
        Self::new(room, "TimeOutError")
    }
}

/// Reply read from a session: `[kind, payload]` on the wire
#[derive(Debug, Clone, PartialEq)]
pub struct InboundFeedback {
    pub kind: String,
    pub payload: Option<String>,
}

impl InboundFeedback {
    pub fn new(kind: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            payload: Some(payload.into()),
        }
    }

    pub fn is_terminate(&self) -> bool {
        self.kind == TERMINATE_KIND
    }

    /// Parse a reply payload (pure function)
    ///
    /// The first array element is the kind, the second the human's text. Non-string
    /// elements are rendered as JSON text.
    pub fn from_slice(payload: &[u8]) -> Result<Self, String> {
        let value: Value = serde_json::from_slice(payload)
            .map_err(|e| format!("Failed to parse feedback: {e}"))?;

        let items = value
            .as_array()
            .ok_or_else(|| "Feedback must be a JSON array".to_string())?;

        let kind = items
            .first()
            .map(render_element)
            .ok_or_else(|| "Feedback array is empty".to_string())?;
        let payload = items.get(1).map(render_element);

        Ok(Self { kind, payload })
    }
}

fn render_element(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
