//! MCP server launch specs, read from `config/mcp_servers.json`.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

fn default_call_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    /// Server id; becomes the prefix of every tool it exports.
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Per-call budget for this server's tools.
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
}

impl McpServerConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpServersConfig {
    #[serde(default)]
    pub mcp_servers: Vec<McpServerConfig>,
}

impl McpServersConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading mcp server config {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("parsing mcp server config {}", path.display()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_servers_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "mcp_servers": [
                    {{"name": "time", "command": "uvx", "args": ["mcp-server-time"]}},
                    {{"name": "fetch", "command": "uvx", "args": ["mcp-server-fetch"],
                      "env": {{"NO_COLOR": "1"}}, "call_timeout_secs": 15}}
                ]
            }}"#
        )
        .unwrap();

        let config = McpServersConfig::load(file.path()).unwrap();
        assert_eq!(config.mcp_servers.len(), 2);
        assert_eq!(config.mcp_servers[0].call_timeout(), Duration::from_secs(30));
        assert_eq!(config.mcp_servers[1].call_timeout(), Duration::from_secs(15));
        assert_eq!(config.mcp_servers[1].env["NO_COLOR"], "1");
    }

    #[test]
    fn empty_document_is_no_servers() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{}}").unwrap();
        let config = McpServersConfig::load(file.path()).unwrap();
        assert!(config.mcp_servers.is_empty());
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = McpServersConfig::load(Path::new("/nonexistent/mcp.json")).err();
        assert!(err.is_some());
    }
}
