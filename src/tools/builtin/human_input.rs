//! Human input tool implementation
//!
//! Relays a message to the human in a session and waits for their reply.
//! Every outcome is a string: the reply, a termination directive, or `"exit"`
//! when nobody answered in time.

use crate::protocol::{DeliveryMode, ErrorNotice, SocketEvent, SocketMessage};
use crate::tools::{params_schema, Tool, ToolDescription, ToolError};
use crate::transport::{send, SessionConnection};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, error, info, warn, Instrument};

/// Returned when the human asks for all work to stop
pub const TERMINATE_SENTINEL: &str = " TERMINATE ALL TASKS IMMEDIATELY ";

/// Returned when no reply arrived
pub const EXIT_SENTINEL: &str = "exit";

/// Parameters accepted by `human_input`
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct HumanInputParams {
    /// The text message content to be sent to the client.
    #[serde(default)]
    pub text: Option<String>,
}

/// Human-in-the-loop tool bound to one session
pub struct HumanInputTool {
    connection: Arc<dyn SessionConnection>,
    session_id: String,
}

impl HumanInputTool {
    pub fn new(connection: Arc<dyn SessionConnection>, session_id: impl Into<String>) -> Self {
        Self {
            connection,
            session_id: session_id.into(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Unwrap single-field JSON objects some callers wrap their text in
    ///
    /// `{"question": "hi"}` becomes `hi`. Multi-field objects, malformed JSON and
    /// plain text are passed through untouched. A single null field yields `None`.
    pub fn extract_message(text: Option<&str>) -> Option<String> {
        let text = text?;
        if !text.starts_with('{') {
            return Some(text.to_string());
        }

        match serde_json::from_str::<Map<String, Value>>(text) {
            Ok(fields) if fields.len() > 1 => Some(text.to_string()),
            Ok(fields) => fields
                .into_iter()
                .map(|(_, value)| value)
                .find(|value| !value.is_null())
                .map(|value| match value {
                    Value::String(s) => s,
                    other => other.to_string(),
                }),
            Err(e) => {
                error!(error = %e, "Failed to parse JSON-looking input, sending it verbatim");
                Some(text.to_string())
            }
        }
    }

    /// Ask the human and wait for the reply
    pub async fn run(&self, text: Option<&str>) -> String {
        let span = crate::session_span!(room = %self.session_id);
        self.exchange(text).instrument(span).await
    }

    async fn exchange(&self, text: Option<&str>) -> String {
        let envelope =
            SocketMessage::feedback_request(&self.session_id, Self::extract_message(text));
        debug!(chunk_id = %envelope.message.chunk_id, "Requesting human feedback");

        let reply = async {
            send(
                self.connection.as_ref(),
                &self.session_id,
                SocketEvent::Message,
                &envelope,
                DeliveryMode::Both,
            )
            .await?;
            self.connection.receive().await
        }
        .await;

        match reply {
            Ok(feedback) if feedback.is_terminate() => {
                warn!("Human requested termination of all tasks");
                TERMINATE_SENTINEL.to_string()
            }
            Ok(feedback) => {
                info!("Human feedback received");
                feedback.payload.unwrap_or_default()
            }
            Err(e) if e.is_timeout() => {
                warn!(error = %e, "No human feedback before timeout");
                self.notify_timeout().await;
                EXIT_SENTINEL.to_string()
            }
            Err(e) => {
                error!(error = %e, "Human feedback exchange failed");
                EXIT_SENTINEL.to_string()
            }
        }
    }

    /// Best-effort notice that the wait timed out
    async fn notify_timeout(&self) {
        let notice = ErrorNotice::timeout(&self.session_id);
        if let Err(e) = send(
            self.connection.as_ref(),
            &self.session_id,
            SocketEvent::Message,
            &notice,
            DeliveryMode::Direct,
        )
        .await
        {
            warn!(error = %e, "Failed to deliver timeout notice");
        }
    }
}

#[async_trait]
impl Tool for HumanInputTool {
    fn describe(&self) -> ToolDescription {
        ToolDescription {
            name: "human_input".to_string(),
            description: "Sends input to the user. The parameter of the input is called \"text\". It then waits for the human to respond. It returns the human response.".to_string(),
            parameters: params_schema::<HumanInputParams>(),
        }
    }

    async fn initialize(&mut self, _config: Option<&Value>) -> Result<(), ToolError> {
        if !self.connection.is_connected() {
            warn!(room = %self.session_id, "Session connection is not connected yet");
        }
        Ok(())
    }

    async fn execute(&self, parameters: &Value) -> Result<Value, ToolError> {
        let params: HumanInputParams = serde_json::from_value(parameters.clone())
            .map_err(|e| ToolError::ValidationError(e.to_string()))?;

        Ok(Value::String(self.run(params.text.as_deref()).await))
    }
}
