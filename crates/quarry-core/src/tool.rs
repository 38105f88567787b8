//! The seam between the orchestrator and whatever hosts the tools.
//!
//! The orchestrator never talks to a tool transport directly; it sees tool
//! definitions and gets back a `ToolInvocation` that is already safe to hand
//! to the model as a tool result.

use async_trait::async_trait;
use quarry_provider::ToolDef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationStatus {
    Success,
    Error,
    Timeout,
}

/// Outcome of a single tool call. Infallible by construction: transport and
/// server failures are folded into `status` + `content` so a failing tool
/// never aborts the surrounding conversation.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub status: InvocationStatus,
    pub content: String,
}

impl ToolInvocation {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            status: InvocationStatus::Success,
            content: content.into(),
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            status: InvocationStatus::Error,
            content: content.into(),
        }
    }

    pub fn timeout(content: impl Into<String>) -> Self {
        Self {
            status: InvocationStatus::Timeout,
            content: content.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.status != InvocationStatus::Success
    }
}

#[async_trait]
pub trait ToolDispatcher: Send + Sync {
    /// Definitions to advertise in the inference request.
    fn tool_defs(&self) -> Vec<ToolDef>;

    /// Invoke a tool by its advertised name. Unknown names come back as an
    /// error invocation, not an `Err`.
    async fn invoke(&self, name: &str, input: serde_json::Value) -> ToolInvocation;
}

/// Dispatcher with nothing registered.
pub struct NoTools;

#[async_trait]
impl ToolDispatcher for NoTools {
    fn tool_defs(&self) -> Vec<ToolDef> {
        Vec::new()
    }

    async fn invoke(&self, name: &str, _input: serde_json::Value) -> ToolInvocation {
        ToolInvocation::error(format!("unknown tool: {name}"))
    }
}
