//! Agent Tools
//!
//! Tools an LLM agent can call: ask the human in a live session for feedback,
//! search arXiv for recent papers, and call OpenAPI endpoints.
//!
//! # Overview
//!
//! - Session message types and topic layout
//! - A session connection abstraction with an MQTT implementation
//! - A tool system with JSON Schema parameter validation
//! - Structured logging and configuration
//!
//! # Quick Start
//!
//! ```rust
//! use agent_tools::protocol::SocketMessage;
//! use agent_tools::tools::builtin::HumanInputTool;
//!
//! // Agents often wrap their question in a single-field object
//! let text = HumanInputTool::extract_message(Some(r#"{"question": "Deploy now?"}"#));
//! assert_eq!(text.as_deref(), Some("Deploy now?"));
//!
//! // The envelope published to the session
//! let envelope = SocketMessage::feedback_request("room-1", text);
//! let json = serde_json::to_value(&envelope).unwrap();
//! assert_eq!(json["isFeedback"], true);
//! ```

pub mod config;
pub mod error;
pub mod observability;
pub mod protocol;
pub mod testing;
pub mod tools;
pub mod transport;

pub use config::*;
pub use error::{AppError, AppResult};
pub use protocol::*;
pub use tools::{Tool, ToolContext, ToolDescription, ToolError, ToolKind, ToolRecord, ToolSystem};
pub use transport::mqtt::MqttSessionConnection;
pub use transport::{SessionConnection, TransportError};
