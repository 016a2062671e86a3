use super::common::{required_str, resolve_workspace_path, workspace_path_property};
use super::traits::{ExecutionContext, PermissionProbe, Tool};
use super::types::ToolResult;
use crate::permissions::PermissionCategory;
use serde_json::{Value, json};
use std::future::Future;
use std::pin::Pin;

pub struct FileReadTool;

impl Tool for FileReadTool {
    fn name(&self) -> &str {
        "file_read"
    }

    fn description(&self) -> &str {
        "Read a text file from the workspace"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": workspace_path_property()
            },
            "required": ["path"]
        })
    }

    fn permission_probe(&self, input: &Value) -> Option<PermissionProbe> {
        Some(PermissionProbe {
            category: PermissionCategory::FileRead,
            operation: input
                .get("path")
                .and_then(Value::as_str)
                .unwrap_or("?")
                .to_string(),
        })
    }

    fn execute<'a>(
        &'a self,
        input: Value,
        ctx: &'a ExecutionContext,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ToolResult>> + Send + 'a>> {
        Box::pin(async move {
            let raw = match required_str(&input, "path") {
                Ok(raw) => raw.to_string(),
                Err(error) => return Ok(ToolResult::error(error.to_string())),
            };
            let path = match resolve_workspace_path(&ctx.workspace_dir, &raw) {
                Ok(path) => path,
                Err(error) => return Ok(ToolResult::error(error.to_string())),
            };

            match tokio::fs::read_to_string(&path).await {
                Ok(content) => Ok(ToolResult::ok(content)),
                Err(error) => Ok(ToolResult::error(format!(
                    "failed to read '{raw}': {error}"
                ))),
            }
        })
    }
}
