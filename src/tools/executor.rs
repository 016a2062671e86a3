//! Permission-gated tool dispatch.
//!
//! Every failure mode here becomes a `ToolResult` with `is_error` set, never
//! a propagated error: the agent loop must keep running so the model can
//! react to an unknown tool, a denial, or an execution failure.

use super::registry::ToolRegistry;
use super::traits::ExecutionContext;
use super::types::ToolResult;
use crate::events::{EventBus, ToolNotification, UiEvent};
use crate::permissions::{PermissionContext, PermissionEngine};
use std::sync::Arc;

const MAX_TOOL_OUTPUT_BYTES: usize = 262_144; // 256KB
const MAX_TOOL_OUTPUT_LINES: usize = 4_000;

pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    engine: Arc<PermissionEngine>,
    bus: EventBus,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>, engine: Arc<PermissionEngine>, bus: EventBus) -> Self {
        Self {
            registry,
            engine,
            bus,
        }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub async fn execute(
        &self,
        name: &str,
        input: serde_json::Value,
        ctx: &ExecutionContext,
    ) -> ToolResult {
        let Some(tool) = self.registry.get(name) else {
            return ToolResult::error(format!("unknown tool '{name}'"));
        };
        if !ctx.tool_enabled(name) {
            return ToolResult::error(format!("tool '{name}' is not enabled in this chat"));
        }

        // Side-effect-free tools skip the permission engine entirely.
        if let Some(probe) = tool.permission_probe(&input) {
            let decision = self
                .engine
                .check(&PermissionContext {
                    workspace_id: ctx.workspace_id.clone(),
                    chat_id: ctx.chat_id.clone(),
                    agent_id: ctx.agent_id.clone(),
                    category: probe.category,
                    operation: probe.operation.clone(),
                    details: None,
                })
                .await;
            if !decision.allowed {
                let reason = decision.reason.unwrap_or_else(|| "denied".to_string());
                tracing::info!(tool = name, operation = %probe.operation, %reason, "tool denied");
                return ToolResult::error(format!("permission denied: {reason}"));
            }
        }

        let mut result = match tool.execute(input.clone(), ctx).await {
            Ok(result) => result,
            Err(error) => {
                tracing::warn!(tool = name, %error, "tool execution failed");
                ToolResult::error(format!("{error:#}"))
            }
        };

        truncate_output(name, &mut result);

        if !result.is_error
            && let Some(summary) = tool.side_effect_summary(&input, &result)
        {
            self.bus.publish(UiEvent::ToolSideEffect {
                chat_id: ctx.chat_id.clone(),
                notification: ToolNotification {
                    tool_name: name.to_string(),
                    summary,
                },
            });
        }

        result
    }
}

/// Cap oversized tool output before it enters conversation history.
fn truncate_output(tool_name: &str, result: &mut ToolResult) {
    let original_bytes = result.content.len();
    let original_lines = result.content.lines().count();

    let mut truncated = false;
    let mut output = result.content.clone();

    if original_lines > MAX_TOOL_OUTPUT_LINES {
        let lines: Vec<&str> = output.lines().collect();
        output = lines[..MAX_TOOL_OUTPUT_LINES].join("\n");
        truncated = true;
    }

    if output.len() > MAX_TOOL_OUTPUT_BYTES {
        let mut byte_pos = MAX_TOOL_OUTPUT_BYTES;
        while byte_pos > 0 && !output.is_char_boundary(byte_pos) {
            byte_pos -= 1;
        }
        output.truncate(byte_pos);
        truncated = true;
    }

    if truncated {
        output.push_str(&format!(
            "\n... [output truncated: {original_bytes} bytes/{original_lines} lines over limit]"
        ));
        tracing::warn!(
            tool = tool_name,
            original_bytes,
            original_lines,
            "tool output truncated due to size limits"
        );
        result.content = output;
    }
}
