//! Session id validation and topic construction
//!
//! Session ids become a single MQTT topic segment, so they must not contain
//! separators or wildcards.

use super::DeliveryMode;
use thiserror::Error;

pub fn canonicalize_topic(topic: &str) -> String {
    if topic.is_empty() {
        return "/".to_string();
    }

    let mut result = if topic.starts_with('/') {
        topic.to_string()
    } else {
        format!("/{topic}")
    };

    while result.contains("//") {
        result = result.replace("//", "/");
    }

    if result.len() > 1 && result.ends_with('/') {
        result.pop();
    }

    result
}

pub fn validate_session_id(session_id: &str) -> Result<(), ValidationError> {
    if session_id.is_empty() {
        return Err(ValidationError::EmptySessionId);
    }

    for ch in session_id.chars() {
        if matches!(ch, '/' | '+' | '#') || ch.is_control() || ch.is_whitespace() {
            return Err(ValidationError::InvalidSessionIdChar(ch));
        }
    }

    Ok(())
}

/// Topic layout for one session
pub struct SessionTopics;

impl SessionTopics {
    /// Topic every participant of the room listens on
    pub fn broadcast(room: &str, event: &str) -> String {
        canonicalize_topic(&format!("/sessions/{room}/broadcast/{event}"))
    }

    /// Topic the peer of this connection listens on
    pub fn direct(room: &str, event: &str) -> String {
        canonicalize_topic(&format!("/sessions/{room}/direct/{event}"))
    }

    /// Topic human replies are published to
    pub fn feedback(room: &str) -> String {
        canonicalize_topic(&format!("/sessions/{room}/feedback"))
    }

    /// Topics an event is published to, broadcast first
    pub fn delivery(room: &str, event: &str, mode: DeliveryMode) -> Vec<String> {
        let mut topics = Vec::with_capacity(2);
        if mode.includes_broadcast() {
            topics.push(Self::broadcast(room, event));
        }
        if mode.includes_direct() {
            topics.push(Self::direct(room, event));
        }
        topics
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("Session ID cannot be empty")]
    EmptySessionId,
    #[error("Session ID contains invalid character: '{0}'")]
    InvalidSessionIdChar(char),
}
