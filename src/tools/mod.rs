//! Tool system for agent tools
//!
//! Tools are built either from the `[tools]` configuration table or from
//! persisted tool records, keyed by [`ToolKind`]. Parameters are validated
//! against each tool's JSON Schema before execution.

use crate::config::{ArxivSection, HttpSection, ToolConfig, ToolsConfig};
use crate::transport::SessionConnection;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, Instrument};

pub mod builtin;

/// Tool interface consumed by the agent loop
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name, description and JSON Schema of the parameters
    fn describe(&self) -> ToolDescription;

    /// Receives the tool's `config` table; called once before first use
    async fn initialize(&mut self, config: Option<&Value>) -> Result<(), ToolError>;

    /// Receives parameters already validated against `describe().parameters`
    async fn execute(&self, parameters: &Value) -> Result<Value, ToolError>;

    /// Release connections and other resources
    async fn shutdown(&mut self) -> Result<(), ToolError> {
        Ok(())
    }
}

/// Tool description
#[derive(Debug, Clone)]
pub struct ToolDescription {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// JSON Schema for a typed parameter struct
pub(crate) fn params_schema<T: JsonSchema>() -> Value {
    serde_json::to_value(schemars::schema_for!(T)).unwrap_or_else(|_| json!({"type": "object"}))
}

/// Kinds of tool this crate can build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    #[serde(alias = "human_input_tool")]
    HumanInput,
    #[serde(alias = "get_papers_from_arxiv")]
    ArxivSearch,
    #[serde(alias = "openapi_request")]
    OpenApiRequest,
}

impl ToolKind {
    /// Name the tool is registered under when built from configuration
    pub fn builtin_name(&self) -> &'static str {
        match self {
            ToolKind::HumanInput => "human_input",
            ToolKind::ArxivSearch => "get_papers_from_arxiv",
            ToolKind::OpenApiRequest => "openapi_request",
        }
    }
}

impl FromStr for ToolKind {
    type Err = ToolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "human_input" | "human_input_tool" => Ok(ToolKind::HumanInput),
            "arxiv_search" | "get_papers_from_arxiv" => Ok(ToolKind::ArxivSearch),
            "open_api_request" | "openapi_request" => Ok(ToolKind::OpenApiRequest),
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }
}

/// Persisted description of a configured tool
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolRecord {
    pub name: String,
    pub description: String,
    pub kind: ToolKind,
    #[serde(default)]
    pub data: Option<ToolData>,
}

/// Function metadata attached to a [`ToolRecord`]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ToolData {
    pub name: Option<String>,
    pub code: Option<String>,
    #[serde(default)]
    pub parameters: Option<ToolParameters>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ToolParameters {
    #[serde(default)]
    pub properties: Option<Map<String, Value>>,
}

impl ToolRecord {
    /// Function name from the record's data, required for code-backed tools
    pub fn require_function_name(&self) -> Result<&str, ToolError> {
        self.data
            .as_ref()
            .and_then(|d| d.name.as_deref())
            .ok_or_else(|| {
                ToolError::InitializationError(format!(
                    "Tool record '{}' is missing data.name",
                    self.name
                ))
            })
    }

    pub fn code(&self) -> &str {
        self.data
            .as_ref()
            .and_then(|d| d.code.as_deref())
            .unwrap_or_default()
    }

    pub fn properties(&self) -> Option<&Map<String, Value>> {
        self.data
            .as_ref()
            .and_then(|d| d.parameters.as_ref())
            .and_then(|p| p.properties.as_ref())
    }
}

/// Everything a tool may need from its surroundings
#[derive(Clone, Default)]
pub struct ToolContext {
    pub connection: Option<Arc<dyn SessionConnection>>,
    pub session_id: Option<String>,
    pub arxiv: ArxivSection,
    pub http: HttpSection,
}

impl ToolContext {
    pub fn from_config(config: &ToolsConfig) -> Self {
        Self {
            connection: None,
            session_id: config
                .session
                .as_ref()
                .and_then(|s| s.session_id.clone()),
            arxiv: config.arxiv.clone(),
            http: config.http.clone(),
        }
    }

    pub fn with_session(
        mut self,
        connection: Arc<dyn SessionConnection>,
        session_id: impl Into<String>,
    ) -> Self {
        self.connection = Some(connection);
        self.session_id = Some(session_id.into());
        self
    }

    fn require_session(&self) -> Result<(Arc<dyn SessionConnection>, String), ToolError> {
        match (&self.connection, &self.session_id) {
            (Some(connection), Some(session_id)) => Ok((connection.clone(), session_id.clone())),
            _ => Err(ToolError::InitializationError(
                "human_input requires a session connection and session id".to_string(),
            )),
        }
    }
}

/// Registry owning the configured tools
pub struct ToolSystem {
    tools: HashMap<String, Box<dyn Tool>>,
    context: ToolContext,
}

impl ToolSystem {
    pub fn new(context: ToolContext) -> Self {
        Self {
            tools: HashMap::new(),
            context,
        }
    }

    /// Initialize tools from the `[tools]` configuration table
    pub async fn initialize(
        &mut self,
        tool_configs: &HashMap<String, ToolConfig>,
    ) -> Result<(), ToolError> {
        for (tool_name, tool_config) in tool_configs {
            let mut tool = self.create_tool(tool_name, tool_config)?;

            let config = match tool_config {
                ToolConfig::Simple(_) => None,
                ToolConfig::Complex { config, .. } => Some(
                    serde_json::to_value(config)
                        .map_err(|e| ToolError::InitializationError(e.to_string()))?,
                ),
            };

            tool.initialize(config.as_ref()).await?;
            info!(tool = %tool_name, "Tool initialized");

            self.tools.insert(tool_name.clone(), tool);
        }

        Ok(())
    }

    /// Build, initialize and register a tool from a persisted record
    ///
    /// Returns the name the tool was registered under.
    pub async fn register_record(&mut self, record: &ToolRecord) -> Result<String, ToolError> {
        let mut tool = self.create_from_record(record)?;
        tool.initialize(None).await?;

        let name = tool.describe().name;
        info!(tool = %name, kind = ?record.kind, "Tool registered from record");
        self.tools.insert(name.clone(), tool);
        Ok(name)
    }

    fn create_tool(&self, tool_name: &str, config: &ToolConfig) -> Result<Box<dyn Tool>, ToolError> {
        let impl_name = match config {
            ToolConfig::Simple(impl_name) => impl_name,
            ToolConfig::Complex { implementation, .. } => implementation,
        };

        match impl_name.as_str() {
            "builtin" => self.create_builtin_tool(tool_name.parse()?),
            _ => Err(ToolError::UnknownImplementation(impl_name.clone())),
        }
    }

    fn create_builtin_tool(&self, kind: ToolKind) -> Result<Box<dyn Tool>, ToolError> {
        match kind {
            ToolKind::HumanInput => {
                let (connection, session_id) = self.context.require_session()?;
                Ok(Box::new(builtin::HumanInputTool::new(connection, session_id)))
            }
            ToolKind::ArxivSearch => Ok(Box::new(builtin::ArxivSearchTool::new(
                &self.context.arxiv,
            ))),
            ToolKind::OpenApiRequest => Ok(Box::new(builtin::OpenApiRequestTool::new(
                &self.context.http,
            ))),
        }
    }

    fn create_from_record(&self, record: &ToolRecord) -> Result<Box<dyn Tool>, ToolError> {
        debug!(record = %record.name, kind = ?record.kind, "Building tool from record");
        match record.kind {
            ToolKind::HumanInput => self.create_builtin_tool(ToolKind::HumanInput),
            ToolKind::ArxivSearch => Ok(Box::new(builtin::ArxivSearchTool::from_record(
                record,
                &self.context.arxiv,
            )?)),
            ToolKind::OpenApiRequest => Ok(Box::new(builtin::OpenApiRequestTool::from_record(
                record,
                &self.context.http,
            ))),
        }
    }

    /// Get tool description
    pub fn describe_tool(&self, tool_name: &str) -> Option<ToolDescription> {
        self.tools.get(tool_name).map(|tool| tool.describe())
    }

    /// Execute tool with validated parameters
    pub async fn execute_tool(&self, tool_name: &str, parameters: &Value) -> Result<Value, ToolError> {
        let tool = self
            .tools
            .get(tool_name)
            .ok_or_else(|| ToolError::UnknownTool(tool_name.to_string()))?;

        Self::validate_parameters(&tool.describe(), parameters)?;

        debug!(tool = %tool_name, "Executing tool");
        tool.execute(parameters)
            .instrument(crate::tool_span!(tool = %tool_name))
            .await
    }

    fn validate_parameters(description: &ToolDescription, parameters: &Value) -> Result<(), ToolError> {
        let validator = jsonschema::validator_for(&description.parameters)
            .map_err(|e| ToolError::SchemaError(format!("Schema compilation error: {e}")))?;

        validator.validate(parameters).map_err(|errors| {
            let error_messages: Vec<String> = errors
                .map(|e| format!("At '{}': {}", e.instance_path, e))
                .collect();
            ToolError::ValidationError(error_messages.join("; "))
        })
    }

    /// Get sorted list of available tools
    pub fn list_tools(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Shutdown all tools
    pub async fn shutdown(&mut self) -> Result<(), ToolError> {
        for tool in self.tools.values_mut() {
            tool.shutdown().await?;
        }
        Ok(())
    }
}

impl Default for ToolSystem {
    fn default() -> Self {
        Self::new(ToolContext::default())
    }
}

/// Tool system errors
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("Unknown tool implementation: {0}")]
    UnknownImplementation(String),
    #[error("Tool initialization failed: {0}")]
    InitializationError(String),
    #[error("Parameter validation failed: {0}")]
    ValidationError(String),
    #[error("Schema error: {0}")]
    SchemaError(String),
    #[error("Tool execution failed: {0}")]
    ExecutionError(String),
}
