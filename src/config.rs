//! Configuration system for agent tools
//!
//! Loads the TOML file describing the session connection, the HTTP-backed
//! tools and the `[tools]` table consumed by the tool system.

use crate::protocol::validate_session_id;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use url::Url;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ToolsConfig {
    /// Session connection; required only by `human_input`
    pub session: Option<SessionSection>,
    #[serde(default)]
    pub arxiv: ArxivSection,
    #[serde(default)]
    pub http: HttpSection,
    #[serde(default)]
    pub tools: HashMap<String, ToolConfig>,
}

/// Session connection section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSection {
    /// MQTT broker URL with protocol and port
    pub broker_url: String,
    /// Default session (room) id
    pub session_id: Option<String>,
    /// Environment variable containing username
    pub username_env: Option<String>,
    /// Environment variable containing password
    pub password_env: Option<String>,
    /// How long a receive waits for a reply (default: 300)
    #[serde(default = "default_receive_timeout")]
    pub receive_timeout_secs: u64,
}

fn default_receive_timeout() -> u64 {
    300
}

/// arXiv search section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArxivSection {
    #[serde(default = "default_arxiv_base_url")]
    pub base_url: String,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

impl Default for ArxivSection {
    fn default() -> Self {
        Self {
            base_url: default_arxiv_base_url(),
            max_results: default_max_results(),
            timeout_secs: default_http_timeout(),
        }
    }
}

fn default_arxiv_base_url() -> String {
    "http://export.arxiv.org/api/query".to_string()
}

fn default_max_results() -> usize {
    10
}

fn default_http_timeout() -> u64 {
    30
}

/// Generic HTTP request section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HttpSection {
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

impl Default for HttpSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_http_timeout(),
        }
    }
}

/// Tool configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ToolConfig {
    /// Simple form: tool_name = "identifier"
    Simple(String),
    /// Complex form: tool_name = { impl = "identifier", config = { ... } }
    Complex {
        #[serde(rename = "impl")]
        implementation: String,
        #[serde(default)]
        config: HashMap<String, serde_json::Value>,
    },
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ToolsConfig {
    /// Load configuration from a TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ToolsConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(session) = &self.session {
            session.validate()?;
        }

        if self.arxiv.max_results == 0 {
            return Err(ConfigError::InvalidConfig(
                "arxiv.max_results must be greater than 0".to_string(),
            ));
        }
        Url::parse(&self.arxiv.base_url).map_err(|e| {
            ConfigError::InvalidConfig(format!(
                "arxiv.base_url '{}' is not a valid URL: {e}",
                self.arxiv.base_url
            ))
        })?;

        Ok(())
    }

    /// Session section, or an error naming what is missing
    pub fn require_session(&self) -> Result<&SessionSection, ConfigError> {
        self.session.as_ref().ok_or_else(|| {
            ConfigError::InvalidConfig("[session] section is required".to_string())
        })
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[session]
broker_url = "mqtt://localhost:1883"
session_id = "test-room"
receive_timeout_secs = 5

[tools]
human_input = "builtin"
"#;
        toml::from_str(toml_content).expect("Test config should parse")
    }
}

impl SessionSection {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = Url::parse(&self.broker_url).map_err(|_| {
            ConfigError::InvalidConfig(format!("Invalid broker URL: {}", self.broker_url))
        })?;
        if !matches!(url.scheme(), "mqtt" | "mqtts") {
            return Err(ConfigError::InvalidConfig(format!(
                "Broker URL must use mqtt:// or mqtts://, got {}",
                url.scheme()
            )));
        }

        if let Some(session_id) = &self.session_id {
            validate_session_id(session_id)
                .map_err(|e| ConfigError::InvalidConfig(e.to_string()))?;
        }

        if self.receive_timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "session.receive_timeout_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    fn get_env_var_optional(env_var_name: Option<&String>) -> Option<String> {
        env_var_name.and_then(|name| std::env::var(name).ok())
    }

    /// Get broker username from environment variable
    pub fn username(&self) -> Option<String> {
        Self::get_env_var_optional(self.username_env.as_ref())
    }

    /// Get broker password from environment variable
    pub fn password(&self) -> Option<String> {
        Self::get_env_var_optional(self.password_env.as_ref())
    }

    /// Configured session id, or an error when none is set
    pub fn require_session_id(&self) -> Result<&str, ConfigError> {
        self.session_id
            .as_deref()
            .ok_or_else(|| ConfigError::InvalidConfig("session.session_id is not set".to_string()))
    }
}
