use super::common::{required_str, resolve_workspace_path, workspace_path_property};
use super::traits::{ExecutionContext, PermissionProbe, Tool};
use super::types::ToolResult;
use crate::permissions::PermissionCategory;
use serde_json::{Value, json};
use std::future::Future;
use std::pin::Pin;

/// Write file contents with path sandboxing.
pub struct FileWriteTool;

impl Tool for FileWriteTool {
    fn name(&self) -> &str {
        "file_write"
    }

    fn description(&self) -> &str {
        "Write contents to a file in the workspace"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": workspace_path_property(),
                "content": {
                    "type": "string",
                    "description": "Full contents to write"
                }
            },
            "required": ["path", "content"]
        })
    }

    fn permission_probe(&self, input: &Value) -> Option<PermissionProbe> {
        Some(PermissionProbe {
            category: PermissionCategory::FileWrite,
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
            let Some(content) = input.get("content").and_then(Value::as_str) else {
                return Ok(ToolResult::error("missing required argument 'content'"));
            };
            let path = match resolve_workspace_path(&ctx.workspace_dir, &raw) {
                Ok(path) => path,
                Err(error) => return Ok(ToolResult::error(error.to_string())),
            };

            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            match tokio::fs::write(&path, content).await {
                Ok(()) => Ok(ToolResult::ok(format!(
                    "wrote {} bytes to {raw}",
                    content.len()
                ))),
                Err(error) => Ok(ToolResult::error(format!(
                    "failed to write '{raw}': {error}"
                ))),
            }
        })
    }

    fn side_effect_summary(&self, input: &Value, _result: &ToolResult) -> Option<String> {
        let path = input.get("path").and_then(Value::as_str)?;
        Some(format!("file written: {path}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ctx(dir: &TempDir) -> ExecutionContext {
        ExecutionContext::new("ws-1", "chat-1", dir.path().to_path_buf())
    }

    #[tokio::test]
    async fn writes_and_creates_parents() {
        let dir = TempDir::new().unwrap();
        let result = FileWriteTool
            .execute(
                json!({"path": "notes/todo.md", "content": "buy milk"}),
                &ctx(&dir),
            )
            .await
            .unwrap();
        assert!(!result.is_error);
        let written = std::fs::read_to_string(dir.path().join("notes/todo.md")).unwrap();
        assert_eq!(written, "buy milk");
    }

    #[tokio::test]
    async fn missing_content_is_error_result() {
        let dir = TempDir::new().unwrap();
        let result = FileWriteTool
            .execute(json!({"path": "a.txt"}), &ctx(&dir))
            .await
            .unwrap();
        assert!(result.is_error);
        assert!(result.content.contains("content"));
    }

    #[tokio::test]
    async fn absolute_path_is_error_result() {
        let dir = TempDir::new().unwrap();
        let result = FileWriteTool
            .execute(json!({"path": "/etc/hosts", "content": "x"}), &ctx(&dir))
            .await
            .unwrap();
        assert!(result.is_error);
    }

    #[test]
    fn probe_is_file_write_with_path() {
        let probe = FileWriteTool
            .permission_probe(&json!({"path": "a.txt", "content": ""}))
            .unwrap();
        assert_eq!(probe.category, PermissionCategory::FileWrite);
        assert_eq!(probe.operation, "a.txt");
    }

    #[test]
    fn summary_names_the_path() {
        let summary = FileWriteTool
            .side_effect_summary(&json!({"path": "a.txt"}), &ToolResult::ok("ok"))
            .unwrap();
        assert_eq!(summary, "file written: a.txt");
    }
}
