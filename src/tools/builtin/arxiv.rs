//! arXiv search tool implementation
//!
//! Queries the arXiv Atom API for the most recently submitted papers matching a
//! query and returns their titles.

use super::error_result;
use crate::config::ArxivSection;
use crate::tools::{params_schema, Tool, ToolDescription, ToolError, ToolRecord};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, error};

const TOOL_NAME: &str = "get_papers_from_arxiv";
const TOOL_DESCRIPTION: &str =
    "Search arXiv for the most recently submitted papers matching a query. Returns paper titles.";

static ENTRY_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<entry[\s>].*?</entry>").expect("valid entry pattern"));

static TITLE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<title[^>]*>(.*?)</title>").expect("valid title pattern"));

static ENTITY_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(#x[0-9a-fA-F]+|#[0-9]+|amp|lt|gt|quot|apos);").expect("valid entity pattern")
});

/// Parameters accepted by the arXiv search tool
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ArxivSearchParams {
    /// Search query, e.g. `all:transformers` or `ti:"graph neural"`
    pub query: String,
}

/// arXiv search tool - builtin implementation
pub struct ArxivSearchTool {
    name: String,
    description: String,
    function_name: String,
    code: String,
    properties: Option<Map<String, Value>>,
    base_url: String,
    max_results: usize,
    timeout: Duration,
    client: Option<reqwest::Client>,
}

impl ArxivSearchTool {
    pub fn new(section: &ArxivSection) -> Self {
        Self {
            name: TOOL_NAME.to_string(),
            description: TOOL_DESCRIPTION.to_string(),
            function_name: TOOL_NAME.to_string(),
            code: String::new(),
            properties: None,
            base_url: section.base_url.clone(),
            max_results: section.max_results,
            timeout: Duration::from_secs(section.timeout_secs),
            client: None,
        }
    }

    /// Build from a persisted record; `data.name` is required
    pub fn from_record(record: &ToolRecord, section: &ArxivSection) -> Result<Self, ToolError> {
        let function_name = record.require_function_name()?.to_string();

        Ok(Self {
            name: record.name.clone(),
            description: record.description.clone(),
            function_name,
            code: record.code().to_string(),
            properties: record.properties().cloned(),
            ..Self::new(section)
        })
    }

    pub fn function_name(&self) -> &str {
        &self.function_name
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    /// Query string pairs for a search (pure function)
    fn build_query_params(query: &str, max_results: usize) -> Vec<(&'static str, String)> {
        vec![
            ("search_query", query.to_string()),
            ("start", "0".to_string()),
            ("max_results", max_results.to_string()),
            ("sortBy", "submittedDate".to_string()),
            ("sortOrder", "descending".to_string()),
        ]
    }

    /// Extract entry titles from an Atom feed (pure function)
    ///
    /// The feed's own `<title>` is skipped; only titles inside `<entry>` count.
    pub fn parse_feed_titles(feed: &str) -> Vec<String> {
        ENTRY_PATTERN
            .find_iter(feed)
            .filter_map(|entry| TITLE_PATTERN.captures(entry.as_str()))
            .map(|caps| {
                let collapsed = caps[1].split_whitespace().collect::<Vec<_>>().join(" ");
                decode_entities(&collapsed)
            })
            .collect()
    }

    /// Typed schema with any extra record properties merged in; `query` always
    /// keeps its own definition and stays required
    fn parameters_schema(&self) -> Value {
        let mut schema = params_schema::<ArxivSearchParams>();
        if let (Some(extra), Some(properties)) = (
            &self.properties,
            schema.get_mut("properties").and_then(Value::as_object_mut),
        ) {
            for (name, definition) in extra {
                properties
                    .entry(name.clone())
                    .or_insert_with(|| definition.clone());
            }
        }
        schema
    }

    /// Fetch the titles of the latest papers matching `query`
    pub async fn search(&self, query: &str) -> Result<Vec<String>, ToolError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| ToolError::ExecutionError("Tool not initialized".to_string()))?;

        debug!(query = %query, max_results = self.max_results, "Querying arXiv");

        let response = client
            .get(&self.base_url)
            .query(&Self::build_query_params(query, self.max_results))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ToolError::ExecutionError(format!("Request failed: {e}")))?;

        let feed = response
            .text()
            .await
            .map_err(|e| ToolError::ExecutionError(format!("Failed to read response: {e}")))?;

        Ok(Self::parse_feed_titles(&feed))
    }

    /// Search and render the outcome as the tool result
    pub async fn run(&self, query: &str) -> Value {
        match self.search(query).await {
            Ok(titles) => json!(titles),
            Err(e) => {
                error!(tool = %self.name, error = %e, "arXiv search failed");
                error_result(e)
            }
        }
    }
}

/// Decode the XML entities arXiv emits in titles (pure function)
fn decode_entities(text: &str) -> String {
    ENTITY_PATTERN
        .replace_all(text, |caps: &Captures| {
            let entity = &caps[1];
            let decoded = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ => entity
                    .strip_prefix("#x")
                    .map(|hex| u32::from_str_radix(hex, 16))
                    .unwrap_or_else(|| entity[1..].parse::<u32>())
                    .ok()
                    .and_then(char::from_u32),
            };
            decoded.map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}

#[async_trait]
impl Tool for ArxivSearchTool {
    fn describe(&self) -> ToolDescription {
        ToolDescription {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters_schema(),
        }
    }

    async fn initialize(&mut self, config: Option<&Value>) -> Result<(), ToolError> {
        if let Some(config) = config {
            if let Some(max_results) = config.get("max_results").and_then(|v| v.as_u64()) {
                if max_results == 0 {
                    return Err(ToolError::InitializationError(
                        "max_results must be greater than 0".to_string(),
                    ));
                }
                self.max_results = max_results as usize;
            }
            if let Some(base_url) = config.get("base_url").and_then(|v| v.as_str()) {
                self.base_url = base_url.to_string();
            }
            if let Some(timeout) = config.get("timeout_secs").and_then(|v| v.as_u64()) {
                self.timeout = Duration::from_secs(timeout);
            }
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
        let params: ArxivSearchParams = serde_json::from_value(parameters.clone())
            .map_err(|e| ToolError::ValidationError(e.to_string()))?;

        Ok(self.run(&params.query).await)
    }

    async fn shutdown(&mut self) -> Result<(), ToolError> {
        self.client = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{ToolData, ToolKind, ToolParameters};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title type="html">ArXiv Query: search_query=all:graphs</title>
  <entry>
    <id>http://arxiv.org/abs/2401.00001v1</id>
    <title>Graph Neural Networks
      for Molecules</title>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/2401.00002v1</id>
    <title>Q&amp;A over &lt;Tables&gt;</title>
  </entry>
</feed>"#;

    async fn initialized_tool(base_url: &str) -> ArxivSearchTool {
        let section = ArxivSection {
            base_url: base_url.to_string(),
            max_results: 2,
            timeout_secs: 5,
        };
        let mut tool = ArxivSearchTool::new(&section);
        tool.initialize(None).await.unwrap();
        tool
    }

    #[test]
    fn test_parse_feed_titles() {
        assert_eq!(
            ArxivSearchTool::parse_feed_titles(FEED),
            vec![
                "Graph Neural Networks for Molecules".to_string(),
                "Q&A over <Tables>".to_string()
            ]
        );
    }

    #[test]
    fn test_parse_empty_feed() {
        let feed = r#"<feed><title>ArXiv Query</title></feed>"#;
        assert!(ArxivSearchTool::parse_feed_titles(feed).is_empty());
    }

    #[test]
    fn test_decode_entities() {
        assert_eq!(decode_entities("a &amp;lt; b"), "a &lt; b");
        assert_eq!(decode_entities("&#233;t&#xE9;"), "été");
        assert_eq!(decode_entities("&quot;x&apos;"), "\"x'");
        assert_eq!(decode_entities("&nbsp;"), "&nbsp;");
    }

    #[test]
    fn test_build_query_params() {
        let params = ArxivSearchTool::build_query_params("all:llm", 7);
        assert!(params.contains(&("search_query", "all:llm".to_string())));
        assert!(params.contains(&("start", "0".to_string())));
        assert!(params.contains(&("max_results", "7".to_string())));
        assert!(params.contains(&("sortBy", "submittedDate".to_string())));
        assert!(params.contains(&("sortOrder", "descending".to_string())));
    }

    #[tokio::test]
    async fn test_search_returns_titles() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/query"))
            .and(query_param("search_query", "all:graphs"))
            .and(query_param("max_results", "2"))
            .and(query_param("sortBy", "submittedDate"))
            .respond_with(ResponseTemplate::new(200).set_body_string(FEED))
            .mount(&mock_server)
            .await;

        let tool = initialized_tool(&format!("{}/api/query", mock_server.uri())).await;
        let result = tool.execute(&json!({"query": "all:graphs"})).await.unwrap();

        assert_eq!(
            result,
            json!(["Graph Neural Networks for Molecules", "Q&A over <Tables>"])
        );
    }

    #[tokio::test]
    async fn test_server_error_becomes_error_string() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let tool = initialized_tool(&mock_server.uri()).await;
        let result = tool.run("all:graphs").await;

        let text = result.as_str().unwrap();
        assert!(text.starts_with("An error occurred: "));
        assert!(text.contains("503"));
    }

    #[tokio::test]
    async fn test_uninitialized_tool_reports_error() {
        let tool = ArxivSearchTool::new(&ArxivSection::default());
        let result = tool.run("all:graphs").await;
        assert!(result.as_str().unwrap().contains("Tool not initialized"));
    }

    #[tokio::test]
    async fn test_initialize_reads_config() {
        let mut tool = ArxivSearchTool::new(&ArxivSection::default());
        tool.initialize(Some(&json!({"max_results": 3, "base_url": "http://localhost:9/q"})))
            .await
            .unwrap();

        assert_eq!(tool.max_results, 3);
        assert_eq!(tool.base_url, "http://localhost:9/q");

        let result = tool.initialize(Some(&json!({"max_results": 0}))).await;
        assert!(matches!(result, Err(ToolError::InitializationError(_))));
    }

    #[test]
    fn test_from_record_copies_metadata() {
        let mut properties = Map::new();
        properties.insert("query".to_string(), json!({"type": "string"}));
        let record = ToolRecord {
            name: "papers".to_string(),
            description: "Latest papers".to_string(),
            kind: ToolKind::ArxivSearch,
            data: Some(ToolData {
                name: Some("get_papers_from_arxiv".to_string()),
                code: Some("return search(query)".to_string()),
                parameters: Some(ToolParameters {
                    properties: Some(properties),
                }),
            }),
        };

        let tool = ArxivSearchTool::from_record(&record, &ArxivSection::default()).unwrap();
        let description = tool.describe();

        assert_eq!(description.name, "papers");
        assert_eq!(description.description, "Latest papers");
        assert_eq!(description.parameters["required"], json!(["query"]));
        assert_eq!(tool.function_name(), "get_papers_from_arxiv");
        assert_eq!(tool.code(), "return search(query)");
    }

    #[tokio::test]
    async fn test_record_without_query_property_still_searches() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("search_query", "all:graphs"))
            .respond_with(ResponseTemplate::new(200).set_body_string(FEED))
            .mount(&mock_server)
            .await;

        let mut properties = Map::new();
        properties.insert("topic".to_string(), json!({"type": "string"}));
        let record = ToolRecord {
            name: "papers".to_string(),
            description: "Latest papers".to_string(),
            kind: ToolKind::ArxivSearch,
            data: Some(ToolData {
                name: Some("get_papers_from_arxiv".to_string()),
                code: None,
                parameters: Some(ToolParameters {
                    properties: Some(properties),
                }),
            }),
        };
        let section = ArxivSection {
            base_url: mock_server.uri(),
            ..ArxivSection::default()
        };
        let mut tool = ArxivSearchTool::from_record(&record, &section).unwrap();
        tool.initialize(None).await.unwrap();

        let schema = tool.describe().parameters;
        assert_eq!(schema["required"], json!(["query"]));
        assert_eq!(schema["properties"]["query"]["type"], "string");
        assert_eq!(schema["properties"]["topic"]["type"], "string");

        let result = tool
            .execute(&json!({"query": "all:graphs", "topic": "graphs"}))
            .await
            .unwrap();
        assert_eq!(result.as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn test_record_cannot_override_query_type() {
        let mut properties = Map::new();
        properties.insert("query".to_string(), json!({"type": "integer"}));
        let tool = ArxivSearchTool {
            properties: Some(properties),
            ..ArxivSearchTool::new(&ArxivSection::default())
        };

        assert_eq!(tool.describe().parameters["properties"]["query"]["type"], "string");
    }

    #[test]
    fn test_default_schema_requires_string_query() {
        let tool = ArxivSearchTool::new(&ArxivSection::default());
        let schema = tool.describe().parameters;

        assert_eq!(schema["properties"]["query"]["type"], "string");
        assert_eq!(schema["required"], json!(["query"]));
    }
}
