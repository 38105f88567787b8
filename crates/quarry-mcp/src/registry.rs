//! Tool registry: one flat namespace over every configured MCP server.
//!
//! Advertised names are `{server}_{tool}` with `-` and `.` collapsed to `_`
//! so they satisfy the inference API's identifier rules. Names longer than
//! the cap are truncated deterministically: a short server prefix plus the
//! tail of the tool name, since generated tool names put the discriminating
//! part at the end.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{bail, Result};
use quarry_provider::ToolDef;

pub const MAX_TOOL_NAME_LEN: usize = 64;
const SERVER_PREFIX_LEN: usize = 16;

#[derive(Debug, Clone)]
pub struct RegisteredTool {
    /// Normalized name advertised to the model.
    pub name: String,
    /// Server id from config; resolves the launch spec.
    pub server: String,
    /// Name the tool has on its own server.
    pub original_name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
    pub call_timeout: Duration,
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
    order: Vec<String>,
    max_tool_params: Option<usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip tools whose input schema declares at least this many parameters.
    pub fn with_max_params(mut self, ceiling: Option<usize>) -> Self {
        self.max_tool_params = ceiling;
        self
    }

    /// Register one tool under its normalized name and return that name.
    /// Fails (so the caller can skip just this tool) on a name collision or
    /// a schema over the parameter ceiling.
    pub fn register(
        &mut self,
        server: &str,
        original_name: &str,
        description: &str,
        input_schema: serde_json::Value,
        call_timeout: Duration,
    ) -> Result<String> {
        if let Some(ceiling) = self.max_tool_params {
            let params = input_schema
                .get("properties")
                .and_then(|p| p.as_object())
                .map(|p| p.len())
                .unwrap_or(0);
            if params >= ceiling {
                bail!("tool {original_name} declares {params} parameters (ceiling {ceiling})");
            }
        }

        let name = normalize_name(server, original_name);
        if self.tools.contains_key(&name) {
            bail!("tool name collision: {name}");
        }

        self.tools.insert(
            name.clone(),
            RegisteredTool {
                name: name.clone(),
                server: server.to_string(),
                original_name: original_name.to_string(),
                description: description.to_string(),
                input_schema,
                call_timeout,
            },
        );
        self.order.push(name.clone());
        Ok(name)
    }

    /// Definitions in registration order.
    pub fn tool_defs(&self) -> Vec<ToolDef> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|t| ToolDef {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: t.input_schema.clone(),
            })
            .collect()
    }

    pub fn resolve(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Same inputs always yield the same name, and the name always fits the cap.
pub fn normalize_name(server: &str, tool: &str) -> String {
    let server = sanitize(server);
    let tool = sanitize(tool);
    let full = format!("{server}_{tool}");
    if full.chars().count() <= MAX_TOOL_NAME_LEN {
        return full;
    }

    let prefix: String = server.chars().take(SERVER_PREFIX_LEN).collect();
    let budget = MAX_TOOL_NAME_LEN - prefix.chars().count() - 1;
    let tool_chars: Vec<char> = tool.chars().collect();
    let start = tool_chars.len().saturating_sub(budget);
    let tail: String = tool_chars[start..].iter().collect();
    format!("{prefix}_{tail}")
}

fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| if c == '-' || c == '.' { '_' } else { c })
        .collect()
}
