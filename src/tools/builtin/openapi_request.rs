//! OpenAPI request tool implementation
//!
//! Calls an arbitrary endpoint described by reserved keyword arguments. All
//! other arguments are sent as query parameters.

use super::error_result;
use crate::config::HttpSection;
use crate::tools::{Tool, ToolDescription, ToolError, ToolRecord};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, error, warn};

const TOOL_NAME: &str = "openapi_request";
const TOOL_DESCRIPTION: &str = "Call an OpenAPI endpoint. Pass the base URL as \"__baseurl\", the path as \"__path\" and the HTTP method as \"__method\"; every other argument is sent as a query parameter.";

pub const BASE_URL_KEY: &str = "__baseurl";
pub const PATH_KEY: &str = "__path";
pub const METHOD_KEY: &str = "__method";

/// HTTP methods an OpenAPI operation may use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    pub fn as_method(&self) -> reqwest::Method {
        match self {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Head => reqwest::Method::HEAD,
            HttpMethod::Options => reqwest::Method::OPTIONS,
        }
    }
}

impl FromStr for HttpMethod {
    type Err = ToolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "get" => Ok(HttpMethod::Get),
            "post" => Ok(HttpMethod::Post),
            "put" => Ok(HttpMethod::Put),
            "patch" => Ok(HttpMethod::Patch),
            "delete" => Ok(HttpMethod::Delete),
            "head" => Ok(HttpMethod::Head),
            "options" => Ok(HttpMethod::Options),
            other => Err(ToolError::ValidationError(format!(
                "Unsupported HTTP method: {other}"
            ))),
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_method().as_str())
    }
}

/// A request assembled from the tool's keyword arguments
#[derive(Debug, Clone, PartialEq)]
pub struct OpenApiRequest {
    pub base_url: String,
    pub path: String,
    pub method: HttpMethod,
    pub params: Vec<(String, String)>,
}

impl OpenApiRequest {
    /// Split reserved keys from query parameters (pure function)
    ///
    /// Strings are sent verbatim and nulls are dropped. Arrays become one pair per
    /// element (`tags=a&tags=b`); objects and other scalars are sent as JSON text.
    pub fn from_kwargs(kwargs: &Map<String, Value>) -> Result<Self, ToolError> {
        let base_url = required_str(kwargs, BASE_URL_KEY)?.to_string();
        let path = required_str(kwargs, PATH_KEY)?.to_string();
        let method = required_str(kwargs, METHOD_KEY)?.parse::<HttpMethod>()?;

        let params = kwargs
            .iter()
            .filter(|(key, _)| ![BASE_URL_KEY, PATH_KEY, METHOD_KEY].contains(&key.as_str()))
            .flat_map(|(key, value)| match value {
                Value::Array(items) => items
                    .iter()
                    .filter_map(|item| query_value(item).map(|v| (key.clone(), v)))
                    .collect::<Vec<_>>(),
                other => query_value(other)
                    .map(|v| vec![(key.clone(), v)])
                    .unwrap_or_default(),
            })
            .collect();

        Ok(Self {
            base_url,
            path,
            method,
            params,
        })
    }

    /// Plain concatenation of base URL and path
    pub fn url(&self) -> String {
        format!("{}{}", self.base_url, self.path)
    }
}

fn query_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn required_str<'a>(kwargs: &'a Map<String, Value>, key: &str) -> Result<&'a str, ToolError> {
    match kwargs.get(key) {
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(ToolError::ValidationError(format!("{key} must be a string"))),
        None => Err(ToolError::ValidationError(format!("Missing required argument {key}"))),
    }
}

/// OpenAPI request tool - builtin implementation
pub struct OpenApiRequestTool {
    name: String,
    description: String,
    properties: Option<Map<String, Value>>,
    timeout: Duration,
    client: Option<reqwest::Client>,
}

impl OpenApiRequestTool {
    pub fn new(section: &HttpSection) -> Self {
        Self {
            name: TOOL_NAME.to_string(),
            description: TOOL_DESCRIPTION.to_string(),
            properties: None,
            timeout: Duration::from_secs(section.timeout_secs),
            client: None,
        }
    }

    /// Build from a persisted record; the record's properties describe the
    /// operation's query parameters
    pub fn from_record(record: &ToolRecord, section: &HttpSection) -> Self {
        Self {
            name: record.name.clone(),
            description: record.description.clone(),
            properties: record.properties().cloned(),
            ..Self::new(section)
        }
    }

    fn parameters_schema(&self) -> Value {
        let mut properties = self.properties.clone().unwrap_or_default();
        properties.insert(
            BASE_URL_KEY.to_string(),
            json!({"type": "string", "description": "Base URL of the API"}),
        );
        properties.insert(
            PATH_KEY.to_string(),
            json!({"type": "string", "description": "Operation path, appended to the base URL"}),
        );
        properties.insert(
            METHOD_KEY.to_string(),
            json!({"type": "string", "description": "HTTP method, e.g. get or post"}),
        );

        json!({
            "type": "object",
            "properties": properties,
            "additionalProperties": true
        })
    }

    /// Send the request; `None` for any status other than 200
    pub async fn send(&self, request: &OpenApiRequest) -> Result<Option<Value>, ToolError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| ToolError::ExecutionError("Tool not initialized".to_string()))?;

        let url = request.url();
        debug!(method = %request.method, url = %url, params = request.params.len(), "Calling OpenAPI endpoint");

        let response = client
            .request(request.method.as_method(), &url)
            .query(&request.params)
            .send()
            .await
            .map_err(|e| ToolError::ExecutionError(format!("Request failed: {e}")))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            warn!(status = status.as_u16(), url = %url, "OpenAPI endpoint returned non-200 status");
            return Ok(None);
        }

        let body = response
            .json::<Value>()
            .await
            .map_err(|e| ToolError::ExecutionError(format!("Failed to parse response: {e}")))?;
        Ok(Some(body))
    }

    /// Execute the call described by `kwargs` and render the tool result
    pub async fn run(&self, kwargs: &Map<String, Value>) -> Value {
        let outcome = match OpenApiRequest::from_kwargs(kwargs) {
            Ok(request) => self.send(&request).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(body) => body.unwrap_or(Value::Null),
            Err(e) => {
                error!(tool = %self.name, error = %e, "OpenAPI request failed");
                error_result(e)
            }
        }
    }
}

#[async_trait]
impl Tool for OpenApiRequestTool {
    fn describe(&self) -> ToolDescription {
        ToolDescription {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters_schema(),
        }
    }

    async fn initialize(&mut self, config: Option<&Value>) -> Result<(), ToolError> {
        if let Some(timeout) = config
            .and_then(|c| c.get("timeout_secs"))
            .and_then(|v| v.as_u64())
        {
            self.timeout = Duration::from_secs(timeout);
        }

        self.client = Some(
            reqwest::Client::builder()
                .timeout(self.timeout)
                .build()
                .map_err(|e| ToolError::InitializationError(e.to_string()))?,
        );

        Ok(())
    }

    async fn execute(&self, parameters: &Value) -> Result<Value, ToolError> {
        let kwargs = parameters.as_object().ok_or_else(|| {
            ToolError::ValidationError("Parameters must be a JSON object".to_string())
        })?;

        Ok(self.run(kwargs).await)
    }

    async fn shutdown(&mut self) -> Result<(), ToolError> {
        self.client = None;
        Ok(())
    }
}
