//! Human-in-the-loop exchange tests
//!
//! Drives `human_input` through the tool system against a scripted session
//! connection and checks what the human sees and what the agent gets back.

use agent_tools::config::ToolConfig;
use agent_tools::protocol::{DeliveryMode, InboundFeedback, SocketEvent};
use agent_tools::testing::{MockConnection, ScriptedReply};
use agent_tools::tools::builtin::{EXIT_SENTINEL, TERMINATE_SENTINEL};
use agent_tools::tools::{ToolContext, ToolError, ToolSystem};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

async fn human_input_system(connection: Arc<MockConnection>) -> ToolSystem {
    let context = ToolContext::default().with_session(connection, "room-7");
    let mut tool_system = ToolSystem::new(context);

    let tool_configs = HashMap::from([(
        "human_input".to_string(),
        ToolConfig::Simple("builtin".to_string()),
    )]);
    tool_system.initialize(&tool_configs).await.unwrap();
    tool_system
}

#[tokio::test]
async fn test_human_reply_is_returned_to_agent() {
    let connection = Arc::new(MockConnection::with_reply("ok", "Ship it"));
    let tool_system = human_input_system(connection.clone()).await;

    let result = tool_system
        .execute_tool("human_input", &json!({"text": "Ready to deploy?"}))
        .await
        .unwrap();

    assert_eq!(result, json!("Ship it"));

    let emitted = connection.emitted().await;
    assert_eq!(emitted.len(), 1);
    assert_eq!(emitted[0].event, SocketEvent::Message);
    assert_eq!(emitted[0].mode, DeliveryMode::Both);
    assert_eq!(emitted[0].payload["message"]["text"], "Ready to deploy?");
}

#[tokio::test]
async fn test_terminate_reply_stops_all_tasks() {
    let connection = Arc::new(MockConnection::with_reply("terminate", ""));
    let tool_system = human_input_system(connection).await;

    let result = tool_system
        .execute_tool("human_input", &json!({"text": "Keep going?"}))
        .await
        .unwrap();

    assert_eq!(result, Value::String(TERMINATE_SENTINEL.to_string()));
}

#[tokio::test]
async fn test_unanswered_request_times_out_with_notice() {
    let connection = Arc::new(MockConnection::timing_out());
    let tool_system = human_input_system(connection.clone()).await;

    let result = tool_system
        .execute_tool("human_input", &json!({"text": "Hello?"}))
        .await
        .unwrap();

    assert_eq!(result, json!(EXIT_SENTINEL));

    let emitted = connection.emitted().await;
    assert_eq!(emitted.len(), 2);
    assert_eq!(emitted[1].mode, DeliveryMode::Direct);
    assert_eq!(
        emitted[1].payload,
        json!({"room": "room-7", "type": "error", "message": "TimeOutError"})
    );
}

#[tokio::test]
async fn test_wrapped_question_is_unwrapped() {
    let connection = Arc::new(MockConnection::with_reply("ok", "yes"));
    let tool_system = human_input_system(connection.clone()).await;

    tool_system
        .execute_tool("human_input", &json!({"text": "{\"question\": \"hi\"}"}))
        .await
        .unwrap();

    let emitted = connection.emitted().await;
    assert_eq!(emitted[0].payload["message"]["text"], "hi");
}

#[tokio::test]
async fn test_consecutive_requests_use_fresh_chunks() {
    let connection = Arc::new(MockConnection::with_script(vec![
        ScriptedReply::Feedback(InboundFeedback::new("ok", "first")),
        ScriptedReply::Feedback(InboundFeedback::new("ok", "second")),
    ]));
    let tool_system = human_input_system(connection.clone()).await;

    let first = tool_system
        .execute_tool("human_input", &json!({"text": "one"}))
        .await
        .unwrap();
    let second = tool_system
        .execute_tool("human_input", &json!({"text": "two"}))
        .await
        .unwrap();

    assert_eq!(first, json!("first"));
    assert_eq!(second, json!("second"));

    let emitted = connection.emitted().await;
    assert_ne!(
        emitted[0].payload["message"]["chunkId"],
        emitted[1].payload["message"]["chunkId"]
    );
}

#[tokio::test]
async fn test_non_string_text_is_rejected_before_sending() {
    let connection = Arc::new(MockConnection::with_reply("ok", "yes"));
    let tool_system = human_input_system(connection.clone()).await;

    let result = tool_system
        .execute_tool("human_input", &json!({"text": 5}))
        .await;

    assert!(matches!(result, Err(ToolError::ValidationError(_))));
    assert!(connection.emitted().await.is_empty());
}
