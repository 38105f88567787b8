mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use quarry_core::{NoTools, Orchestrator, OrchestratorConfig, ToolDispatcher};
use quarry_gateway::{DispatcherConfig, EventDispatcher};
use quarry_mcp::{McpServersConfig, McpToolRouter};
use quarry_provider::BedrockProvider;
use quarry_server::state::AppState;
use quarry_slack::{MessageLifecycle, SlackClient};

use crate::config::AppConfig;

#[derive(Parser)]
#[command(name = "quarry", version, about = "Tool-augmented Slack conversation bot")]
struct Cli {
    /// Directory holding quarry.yaml, mcp_servers.json and system_prompt.md
    #[arg(short, long, default_value = "config")]
    config_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the Slack events webhook server
    Start,
    /// Check the configuration and exit
    Validate,
    /// Launch the configured MCP servers and list their tools
    Tools,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(&cli.config_dir.join("quarry.yaml"))?;
    init_tracing(config.log_level.as_deref());

    match cli.command {
        Command::Start => start(&cli.config_dir, config).await,
        Command::Validate => validate(&cli.config_dir, &config),
        Command::Tools => list_tools(&cli.config_dir, &config).await,
    }
}

fn init_tracing(level: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.unwrap_or("info")));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn start(config_dir: &Path, config: AppConfig) -> Result<()> {
    let token = config.resolve_slack_token()?;
    let provider = Arc::new(bedrock_provider(&config)?);

    let tools: Arc<dyn ToolDispatcher> = match load_mcp_config(config_dir)? {
        Some(mcp) => {
            let router = McpToolRouter::bootstrap(mcp, config.max_tool_params).await;
            tracing::info!(tools = router.registry().len(), "mcp bootstrap complete");
            Arc::new(router)
        }
        None => {
            tracing::info!("no mcp_servers.json, starting without tools");
            Arc::new(NoTools)
        }
    };

    let orchestrator = Arc::new(Orchestrator::new(
        provider,
        tools,
        orchestrator_config(config_dir, &config),
    ));

    let slack = Arc::new(SlackClient::new(token));
    let lifecycle = Arc::new(MessageLifecycle::new(Arc::clone(&slack)));
    let dispatcher = Arc::new(EventDispatcher::new(
        slack,
        lifecycle,
        orchestrator,
        DispatcherConfig {
            dedup_capacity: config.dedup_capacity,
            max_concurrency: config.max_concurrency,
        },
    ));

    quarry_server::serve(AppState { dispatcher }, &config.listen_addr).await
}

fn validate(config_dir: &Path, config: &AppConfig) -> Result<()> {
    config.resolve_slack_token().map(|_| ())?;
    bedrock_provider(config).map(|_| ())?;

    match load_mcp_config(config_dir)? {
        Some(mcp) => println!("mcp servers: {}", mcp.mcp_servers.len()),
        None => println!("mcp servers: none configured"),
    }
    println!("model: {}", config.model);
    println!("listen: {}", config.listen_addr);
    println!("configuration ok");
    Ok(())
}

async fn list_tools(config_dir: &Path, config: &AppConfig) -> Result<()> {
    let Some(mcp) = load_mcp_config(config_dir)? else {
        println!("no mcp_servers.json found in {}", config_dir.display());
        return Ok(());
    };
    let router = McpToolRouter::bootstrap(mcp, config.max_tool_params).await;
    for def in router.tool_defs() {
        println!("{}  {}", def.name, def.description);
    }
    println!("{} tool(s) registered", router.registry().len());
    Ok(())
}

fn bedrock_provider(config: &AppConfig) -> Result<BedrockProvider> {
    BedrockProvider::from_env(&config.aws_region)
}

fn orchestrator_config(config_dir: &Path, config: &AppConfig) -> OrchestratorConfig {
    let mut orch = OrchestratorConfig {
        model: config.model.clone(),
        max_recursion_depth: config.max_recursion_depth,
        max_tokens: config.max_tokens,
        top_p: config.top_p,
        temperature: config.temperature,
        conversation_budget: Duration::from_secs(config.conversation_budget_secs),
        ..Default::default()
    };
    let prompt_path = config_dir.join("system_prompt.md");
    match std::fs::read_to_string(&prompt_path) {
        Ok(prompt) if !prompt.trim().is_empty() => {
            orch.system_prompt = prompt.trim().to_string();
        }
        _ => {
            tracing::debug!(path = %prompt_path.display(), "using built-in system prompt");
        }
    }
    orch
}

fn load_mcp_config(config_dir: &Path) -> Result<Option<McpServersConfig>> {
    let path = config_dir.join("mcp_servers.json");
    if !path.exists() {
        return Ok(None);
    }
    Ok(Some(McpServersConfig::load(&path)?))
}
