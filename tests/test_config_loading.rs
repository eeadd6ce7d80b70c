//! Configuration loading and validation tests
//!
//! Tests focus on BEHAVIOR of configuration loading, validation, and error handling.

use agent_tools::config::{ConfigError, ToolConfig, ToolsConfig};
use std::io::Write;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(temp_file, "{content}").unwrap();
    temp_file
}

#[test]
fn test_config_loads_successfully_from_valid_toml() {
    let temp_file = write_config(
        r#"
[session]
broker_url = "mqtt://localhost:1883"
session_id = "room-1"

[tools]
human_input = "builtin"
get_papers_from_arxiv = { impl = "builtin", config = { max_results = 5 } }
"#,
    );

    let config = ToolsConfig::load_from_file(temp_file.path()).unwrap();
    let session = config.require_session().unwrap();

    assert_eq!(session.broker_url, "mqtt://localhost:1883");
    assert_eq!(session.require_session_id().unwrap(), "room-1");
    assert_eq!(session.receive_timeout_secs, 300);
    assert_eq!(
        config.tools.get("human_input"),
        Some(&ToolConfig::Simple("builtin".to_string()))
    );
    assert!(matches!(
        config.tools.get("get_papers_from_arxiv"),
        Some(ToolConfig::Complex { implementation, config }) if implementation == "builtin"
            && config.get("max_results") == Some(&serde_json::json!(5))
    ));
}

#[test]
fn test_config_without_session_uses_defaults() {
    let temp_file = write_config("[tools]\nopenapi_request = \"builtin\"");

    let config = ToolsConfig::load_from_file(temp_file.path()).unwrap();

    assert!(config.session.is_none());
    assert!(config.require_session().is_err());
    assert_eq!(config.arxiv.base_url, "http://export.arxiv.org/api/query");
    assert_eq!(config.arxiv.max_results, 10);
    assert_eq!(config.http.timeout_secs, 30);
}

#[test]
fn test_config_fails_when_file_missing() {
    let result = ToolsConfig::load_from_file(std::path::Path::new("/nonexistent/agent-tools.toml"));
    assert!(matches!(result, Err(ConfigError::FileRead(_))));
}

#[test]
fn test_config_fails_on_malformed_toml() {
    let temp_file = write_config("[session\nbroker_url = ");

    let result = ToolsConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::TomlParse(_))));
}

#[test]
fn test_config_rejects_non_mqtt_broker() {
    let temp_file = write_config(
        r#"
[session]
broker_url = "http://localhost:1883"
"#,
    );

    let result = ToolsConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
}

#[test]
fn test_config_rejects_invalid_session_id() {
    let temp_file = write_config(
        r#"
[session]
broker_url = "mqtt://localhost:1883"
session_id = "room/+"
"#,
    );

    let result = ToolsConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
}

#[test]
fn test_config_rejects_zero_limits() {
    let zero_timeout = write_config(
        r#"
[session]
broker_url = "mqtt://localhost:1883"
receive_timeout_secs = 0
"#,
    );
    assert!(matches!(
        ToolsConfig::load_from_file(zero_timeout.path()),
        Err(ConfigError::InvalidConfig(_))
    ));

    let zero_results = write_config("[arxiv]\nmax_results = 0");
    assert!(matches!(
        ToolsConfig::load_from_file(zero_results.path()),
        Err(ConfigError::InvalidConfig(_))
    ));
}

#[test]
fn test_credentials_resolved_from_environment() {
    std::env::set_var("AGENT_TOOLS_TEST_MQTT_USER", "alice");
    let temp_file = write_config(
        r#"
[session]
broker_url = "mqtts://broker.example.com:8883"
username_env = "AGENT_TOOLS_TEST_MQTT_USER"
password_env = "AGENT_TOOLS_TEST_MQTT_PASS_UNSET"
"#,
    );

    let config = ToolsConfig::load_from_file(temp_file.path()).unwrap();
    let session = config.require_session().unwrap();

    assert_eq!(session.username().as_deref(), Some("alice"));
    assert_eq!(session.password(), None);
    assert!(session.require_session_id().is_err());
}
