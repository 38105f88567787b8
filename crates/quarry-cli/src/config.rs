//! Main application config, read from `config/quarry.yaml`. Every field
//! has a default so a missing file means "run with defaults".

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

fn default_listen_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_region() -> String {
    quarry_provider::bedrock::DEFAULT_REGION.to_string()
}

fn default_model() -> String {
    quarry_provider::bedrock::DEFAULT_MODEL.to_string()
}

fn default_recursion_depth() -> u32 {
    5
}

fn default_max_tokens() -> u32 {
    300
}

fn default_top_p() -> f32 {
    0.1
}

fn default_temperature() -> f32 {
    0.3
}

fn default_budget_secs() -> u64 {
    300
}

fn default_dedup_capacity() -> usize {
    1024
}

fn default_max_concurrency() -> usize {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Falls back to the SLACK_BOT_TOKEN environment variable.
    #[serde(default)]
    pub slack_bot_token: Option<String>,
    #[serde(default = "default_region")]
    pub aws_region: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_recursion_depth")]
    pub max_recursion_depth: u32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_budget_secs")]
    pub conversation_budget_secs: u64,
    /// Skip MCP tools declaring at least this many parameters. Off when unset.
    #[serde(default)]
    pub max_tool_params: Option<usize>,
    #[serde(default = "default_dedup_capacity")]
    pub dedup_capacity: usize,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default)]
    pub log_level: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            slack_bot_token: None,
            aws_region: default_region(),
            model: default_model(),
            max_recursion_depth: default_recursion_depth(),
            max_tokens: default_max_tokens(),
            top_p: default_top_p(),
            temperature: default_temperature(),
            conversation_budget_secs: default_budget_secs(),
            max_tool_params: None,
            dedup_capacity: default_dedup_capacity(),
            max_concurrency: default_max_concurrency(),
            log_level: None,
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&raw)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// Bot token: config file first, then environment.
    pub fn resolve_slack_token(&self) -> Result<String> {
        if let Some(token) = &self.slack_bot_token {
            return Ok(token.clone());
        }
        std::env::var("SLACK_BOT_TOKEN")
            .context("slack_bot_token not in config and SLACK_BOT_TOKEN is not set")
    }
}
