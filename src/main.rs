//! Agent Tools - command line entry point
//!
//! Runs a single tool call from the shell, mostly for trying out a session or
//! an endpoint before wiring the tools into an agent.

use agent_tools::config::{ToolConfig, ToolsConfig};
use agent_tools::error::{sanitize_error_message, AppError, AppResult};
use agent_tools::observability::init_default_logging;
use agent_tools::tools::{ToolContext, ToolKind, ToolSystem};
use agent_tools::transport::mqtt::MqttSessionConnection;
use clap::{Parser, Subcommand};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Agent tools: human input, arXiv search and OpenAPI requests
#[derive(Parser)]
#[command(name = "agent-tools")]
#[command(about = "Run agent tools from the command line")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "AGENT_TOOLS_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask the human in a session and print their reply
    Ask {
        /// Session (room) id, overrides session.session_id
        #[arg(long)]
        session: Option<String>,
        /// Text to send
        text: String,
    },
    /// Print the titles of the latest arXiv papers matching a query
    Arxiv {
        /// arXiv search query, e.g. all:transformers
        query: String,
    },
    /// Call an OpenAPI endpoint and print the JSON response
    Request {
        #[arg(long)]
        base_url: String,
        #[arg(long)]
        path: String,
        #[arg(long, default_value = "get")]
        method: String,
        /// Query parameters as KEY=VALUE; values that parse as JSON are sent as JSON
        params: Vec<String>,
    },
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    let config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!(
                "Failed to load configuration: {}",
                sanitize_error_message(&e.to_string())
            );
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Ask { session, text } => run_ask(&config, session, text).await,
        Commands::Arxiv { query } => {
            run_tool(&config, ToolKind::ArxivSearch, json!({ "query": query })).await
        }
        Commands::Request {
            base_url,
            path,
            method,
            params,
        } => match build_request_kwargs(base_url, path, method, &params) {
            Ok(kwargs) => run_tool(&config, ToolKind::OpenApiRequest, Value::Object(kwargs)).await,
            Err(e) => Err(e),
        },
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", sanitize_error_message(&e.to_string()));
        process::exit(1);
    }
}

fn load_configuration(config_path: &Option<PathBuf>) -> AppResult<ToolsConfig> {
    if let Some(path) = config_path {
        info!("Loading configuration from: {}", path.display());
        return Ok(ToolsConfig::load_from_file(path)?);
    }

    for path_str in ["agent-tools.toml", "config/agent-tools.toml"] {
        let path = PathBuf::from(path_str);
        if path.exists() {
            info!("Loading configuration from: {}", path.display());
            return Ok(ToolsConfig::load_from_file(&path)?);
        }
    }

    warn!("No configuration file found, using defaults");
    Ok(ToolsConfig::default())
}

/// The `[tools]` entry for `kind`, or a plain builtin when none is configured
fn tool_entry(config: &ToolsConfig, kind: ToolKind) -> HashMap<String, ToolConfig> {
    let name = kind.builtin_name().to_string();
    let entry = config
        .tools
        .get(&name)
        .cloned()
        .unwrap_or_else(|| ToolConfig::Simple("builtin".to_string()));
    HashMap::from([(name, entry)])
}

async fn execute(
    mut tool_system: ToolSystem,
    config: &ToolsConfig,
    kind: ToolKind,
    parameters: Value,
) -> AppResult<Value> {
    tool_system.initialize(&tool_entry(config, kind)).await?;
    let result = tool_system
        .execute_tool(kind.builtin_name(), &parameters)
        .await;
    tool_system.shutdown().await?;
    Ok(result?)
}

async fn run_tool(
    config: &ToolsConfig,
    kind: ToolKind,
    parameters: Value,
) -> AppResult<()> {
    let tool_system = ToolSystem::new(ToolContext::from_config(config));
    let result = execute(tool_system, config, kind, parameters).await?;
    print_result(&result)
}

async fn run_ask(
    config: &ToolsConfig,
    session: Option<String>,
    text: String,
) -> AppResult<()> {
    let section = config.require_session()?;
    let room = match session {
        Some(room) => room,
        None => section.require_session_id()?.to_string(),
    };

    let connection = Arc::new(MqttSessionConnection::connect(section, &room).await?);
    let context = ToolContext::from_config(config).with_session(connection.clone(), room);

    let result = execute(
        ToolSystem::new(context),
        config,
        ToolKind::HumanInput,
        json!({ "text": text }),
    )
    .await;

    if let Err(e) = connection.disconnect().await {
        warn!("Failed to disconnect cleanly: {}", e);
    }
    print_result(&result?)
}

/// Turn CLI arguments into the tool's keyword arguments
fn build_request_kwargs(
    base_url: String,
    path: String,
    method: String,
    params: &[String],
) -> AppResult<Map<String, Value>> {
    let mut kwargs = Map::new();
    kwargs.insert("__baseurl".to_string(), Value::String(base_url));
    kwargs.insert("__path".to_string(), Value::String(path));
    kwargs.insert("__method".to_string(), Value::String(method));

    for param in params {
        let (key, raw) = param.split_once('=').ok_or_else(|| {
            AppError::invalid_input(format!("Expected KEY=VALUE, got '{param}'"))
        })?;
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        kwargs.insert(key.to_string(), value);
    }

    Ok(kwargs)
}

fn print_result(result: &Value) -> AppResult<()> {
    match result {
        Value::String(text) => println!("{text}"),
        other => {
            let rendered = serde_json::to_string_pretty(other)
                .map_err(|e| AppError::internal_error(e.to_string()))?;
            println!("{rendered}");
        }
    }
    Ok(())
}

fn handle_config_command(config: &ToolsConfig, show: bool) -> AppResult<()> {
    if show {
        let rendered =
            toml::to_string_pretty(config).map_err(|e| AppError::internal_error(e.to_string()))?;
        println!("Current configuration:");
        println!("{rendered}");
    }

    info!("Configuration validation complete");
    Ok(())
}
