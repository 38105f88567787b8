//! MCP tool hosting: server config, the tool registry with its normalized
//! naming scheme, and the per-call stdio invocation client.

pub mod client;
pub mod config;
pub mod registry;

use async_trait::async_trait;
use quarry_core::{ToolDispatcher, ToolInvocation};
use quarry_provider::ToolDef;

pub use client::McpClient;
pub use config::{McpServerConfig, McpServersConfig};
pub use registry::{normalize_name, RegisteredTool, ToolRegistry, MAX_TOOL_NAME_LEN};

/// Registry + invocation client behind the orchestrator's dispatcher seam.
pub struct McpToolRouter {
    registry: ToolRegistry,
    client: McpClient,
}

impl McpToolRouter {
    /// Launch every configured server once to collect its tool inventory.
    /// A server that fails to start or list is logged and skipped; a tool
    /// that fails registration is logged and skipped. The rest keep going.
    pub async fn bootstrap(config: McpServersConfig, max_tool_params: Option<usize>) -> Self {
        let mut registry = ToolRegistry::new().with_max_params(max_tool_params);
        let client = McpClient::new(config.mcp_servers.clone());

        for server in &config.mcp_servers {
            let tools = match client.list_tools(&server.name).await {
                Ok(tools) => tools,
                Err(e) => {
                    tracing::warn!(server = %server.name, error = %e, "skipping mcp server");
                    continue;
                }
            };
            for tool in tools {
                let description = format!(
                    "[{}] {}",
                    server.name,
                    tool.description.as_deref().unwrap_or("")
                );
                let schema = serde_json::Value::Object((*tool.input_schema).clone());
                match registry.register(
                    &server.name,
                    tool.name.as_ref(),
                    &description,
                    schema,
                    server.call_timeout(),
                ) {
                    Ok(name) => {
                        tracing::info!(server = %server.name, tool = %name, "registered tool")
                    }
                    Err(e) => {
                        tracing::warn!(server = %server.name, tool = %tool.name, error = %e,
                            "skipping tool");
                    }
                }
            }
        }

        Self { registry, client }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }
}

#[async_trait]
impl ToolDispatcher for McpToolRouter {
    fn tool_defs(&self) -> Vec<ToolDef> {
        self.registry.tool_defs()
    }

    async fn invoke(&self, name: &str, input: serde_json::Value) -> ToolInvocation {
        match self.registry.resolve(name) {
            Some(tool) => self.client.invoke(tool, input).await,
            None => ToolInvocation::error(format!("unknown tool: {name}")),
        }
    }
}
