use super::types::{ToolResult, ToolSpec};
use crate::permissions::PermissionCategory;
use std::collections::HashSet;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

/// Per-invocation context handed to every tool.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub workspace_id: String,
    pub chat_id: String,
    pub agent_id: Option<String>,
    /// Root for file tools; paths never resolve outside it.
    pub workspace_dir: PathBuf,
    /// Per-conversation tool filter; `None` enables the full catalog.
    pub allowed_tools: Option<HashSet<String>>,
}

impl ExecutionContext {
    pub fn new(workspace_id: &str, chat_id: &str, workspace_dir: PathBuf) -> Self {
        Self {
            workspace_id: workspace_id.to_string(),
            chat_id: chat_id.to_string(),
            agent_id: None,
            workspace_dir,
            allowed_tools: None,
        }
    }

    pub fn tool_enabled(&self, name: &str) -> bool {
        self.allowed_tools
            .as_ref()
            .is_none_or(|allowed| allowed.contains(name))
    }
}

/// What the permission engine should judge for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionProbe {
    pub category: PermissionCategory,
    /// Free-text operation identifier, e.g. a path or command line.
    pub operation: String,
}

/// Core tool trait — implement for any capability
pub trait Tool: Send + Sync {
    /// Tool name (used in LLM function calling)
    fn name(&self) -> &str;

    /// Human-readable description
    fn description(&self) -> &str;

    /// JSON schema for parameters
    fn parameters_schema(&self) -> serde_json::Value;

    /// The gated side effect of this invocation, or `None` for tools with
    /// no side effects (those skip permission checks entirely).
    fn permission_probe(&self, input: &serde_json::Value) -> Option<PermissionProbe>;

    /// Execute the tool with given arguments
    fn execute<'a>(
        &'a self,
        input: serde_json::Value,
        ctx: &'a ExecutionContext,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ToolResult>> + Send + 'a>>;

    /// One-line summary of a successful execution's observable side effect,
    /// published to UI observers. `None` suppresses the notification.
    fn side_effect_summary(
        &self,
        _input: &serde_json::Value,
        _result: &ToolResult,
    ) -> Option<String> {
        None
    }

    /// Get the full spec for LLM registration
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_context_enables_all_tools() {
        let ctx = ExecutionContext::new("ws-1", "chat-1", PathBuf::from("/tmp"));
        assert!(ctx.tool_enabled("anything"));
    }

    #[test]
    fn allowed_tools_filters() {
        let mut ctx = ExecutionContext::new("ws-1", "chat-1", PathBuf::from("/tmp"));
        ctx.allowed_tools = Some(HashSet::from(["file_read".to_string()]));
        assert!(ctx.tool_enabled("file_read"));
        assert!(!ctx.tool_enabled("file_write"));
    }
}
