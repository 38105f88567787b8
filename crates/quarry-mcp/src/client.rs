//! Per-call MCP invocation over stdio child processes.
//!
//! Every call launches a fresh server process, runs the MCP handshake,
//! performs one operation and cancels the session. Slower than a pooled
//! connection, but a wedged or crashed server can never poison later calls.

use std::borrow::Cow;
use std::collections::HashMap;

use anyhow::{anyhow, Context, Result};
use rmcp::model::{CallToolRequestParam, CallToolResult, Tool};
use rmcp::service::RunningService;
use rmcp::transport::{ConfigureCommandExt, TokioChildProcess};
use rmcp::{RoleClient, ServiceExt};

use quarry_core::ToolInvocation;

use crate::config::McpServerConfig;
use crate::registry::RegisteredTool;

pub struct McpClient {
    servers: HashMap<String, McpServerConfig>,
}

impl McpClient {
    pub fn new(configs: Vec<McpServerConfig>) -> Self {
        let servers = configs.into_iter().map(|c| (c.name.clone(), c)).collect();
        Self { servers }
    }

    async fn connect(config: &McpServerConfig) -> Result<RunningService<RoleClient, ()>> {
        let transport = TokioChildProcess::new(
            tokio::process::Command::new(&config.command).configure(|cmd| {
                cmd.args(&config.args)
                    .envs(config.env.iter())
                    .stderr(std::process::Stdio::inherit());
            }),
        )
        .with_context(|| format!("spawning mcp server {}", config.name))?;

        let client = ()
            .serve(transport)
            .await
            .with_context(|| format!("initializing mcp server {}", config.name))?;
        Ok(client)
    }

    /// Tool inventory of one server, via a throwaway session.
    pub async fn list_tools(&self, server: &str) -> Result<Vec<Tool>> {
        let config = self
            .servers
            .get(server)
            .ok_or_else(|| anyhow!("unknown mcp server: {server}"))?;
        let client = Self::connect(config).await?;
        let listed = client.peer().list_all_tools().await;
        if let Err(e) = client.cancel().await {
            tracing::warn!(server, error = %e, "error closing mcp session");
        }
        listed.map_err(|e| anyhow!("listing tools on {server}: {e}"))
    }

    /// Invoke one registered tool. Transport failures, server-side errors
    /// and timeouts all come back as a `ToolInvocation`, never an `Err`.
    pub async fn invoke(&self, tool: &RegisteredTool, input: serde_json::Value) -> ToolInvocation {
        match self.invoke_inner(tool, input).await {
            Ok(invocation) => invocation,
            Err(e) => {
                tracing::warn!(tool = %tool.name, error = %e, "tool invocation failed");
                ToolInvocation::error(format!("Tool execution error: {e}"))
            }
        }
    }

    async fn invoke_inner(
        &self,
        tool: &RegisteredTool,
        input: serde_json::Value,
    ) -> Result<ToolInvocation> {
        let config = self
            .servers
            .get(&tool.server)
            .ok_or_else(|| anyhow!("unknown mcp server: {}", tool.server))?;
        let client = Self::connect(config).await?;

        let arguments = match input {
            serde_json::Value::Object(map) => Some(map),
            _ => None,
        };
        let request = CallToolRequestParam {
            name: Cow::Owned(tool.original_name.clone()),
            arguments,
        };

        let outcome = tokio::time::timeout(tool.call_timeout, client.peer().call_tool(request)).await;
        if let Err(e) = client.cancel().await {
            tracing::warn!(server = %tool.server, error = %e, "error closing mcp session");
        }

        match outcome {
            Err(_) => Ok(ToolInvocation::timeout(format!(
                "Tool call timed out after {}s",
                tool.call_timeout.as_secs()
            ))),
            Ok(Err(e)) => Ok(ToolInvocation::error(format!("Tool call failed: {e}"))),
            Ok(Ok(result)) => Ok(render_result(&result)),
        }
    }
}

/// Flatten a tool result to the text handed back to the model. Text items
/// are joined; anything non-textual falls back to its JSON form.
fn render_result(result: &CallToolResult) -> ToolInvocation {
    let value = serde_json::to_value(&result.content).unwrap_or(serde_json::Value::Null);
    let texts: Vec<String> = value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("text").and_then(|t| t.as_str()))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let content = if texts.is_empty() {
        value.to_string()
    } else {
        texts.join("\n")
    };

    if result.is_error.unwrap_or(false) {
        ToolInvocation::error(content)
    } else {
        ToolInvocation::success(content)
    }
}
