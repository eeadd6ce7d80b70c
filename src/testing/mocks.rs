//! Mock implementations for testing
//!
//! Provides a scripted [`SessionConnection`] so tools can be exercised without
//! a broker or a human on the other end.

use crate::protocol::{DeliveryMode, InboundFeedback, SocketEvent};
use crate::transport::{SessionConnection, TransportError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// One recorded `emit` call
#[derive(Debug, Clone, PartialEq)]
pub struct EmittedEvent {
    pub room: String,
    pub event: SocketEvent,
    pub payload: Value,
    pub mode: DeliveryMode,
}

/// Scripted outcome of one `receive` call
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Feedback(InboundFeedback),
    Timeout,
    Closed,
}

/// Mock session connection for testing
///
/// Replies are consumed in order; an empty script behaves like a timeout.
#[derive(Debug, Default)]
pub struct MockConnection {
    pub emitted: Arc<Mutex<Vec<EmittedEvent>>>,
    pub replies: Arc<Mutex<VecDeque<ScriptedReply>>>,
    pub receive_calls: Arc<Mutex<usize>>,
    /// Fail every emit with a publish error
    pub fail_emits: bool,
    /// Fail emits after this many have succeeded
    pub fail_emits_after: Option<usize>,
    /// Fail emits with a timeout instead of a publish error
    pub emit_times_out: bool,
}

impl MockConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connection that answers the first receive with `(kind, payload)`
    pub fn with_reply(kind: impl Into<String>, payload: impl Into<String>) -> Self {
        Self::with_script(vec![ScriptedReply::Feedback(InboundFeedback::new(
            kind, payload,
        ))])
    }

    pub fn with_script(replies: Vec<ScriptedReply>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies.into())),
            ..Default::default()
        }
    }

    /// Connection whose receive always times out
    pub fn timing_out() -> Self {
        Self::with_script(vec![ScriptedReply::Timeout])
    }

    pub async fn emitted(&self) -> Vec<EmittedEvent> {
        self.emitted.lock().await.clone()
    }

    pub async fn receive_count(&self) -> usize {
        *self.receive_calls.lock().await
    }
}

#[async_trait]
impl SessionConnection for MockConnection {
    async fn emit(
        &self,
        room: &str,
        event: SocketEvent,
        payload: &Value,
        mode: DeliveryMode,
    ) -> Result<(), TransportError> {
        let mut emitted = self.emitted.lock().await;

        let over_limit = self
            .fail_emits_after
            .is_some_and(|limit| emitted.len() >= limit);
        if self.emit_times_out {
            return Err(TransportError::Timeout(Duration::from_millis(1)));
        }
        if self.fail_emits || over_limit {
            return Err(TransportError::PublishFailed(
                "Mock publish failure".to_string().into(),
            ));
        }

        emitted.push(EmittedEvent {
            room: room.to_string(),
            event,
            payload: payload.clone(),
            mode,
        });
        Ok(())
    }

    async fn receive(&self) -> Result<InboundFeedback, TransportError> {
        *self.receive_calls.lock().await += 1;

        match self.replies.lock().await.pop_front() {
            Some(ScriptedReply::Feedback(feedback)) => Ok(feedback),
            Some(ScriptedReply::Closed) => Err(TransportError::Closed),
            Some(ScriptedReply::Timeout) | None => {
                Err(TransportError::Timeout(Duration::from_millis(1)))
            }
        }
    }

    fn is_connected(&self) -> bool {
        !self.fail_emits
    }
}
