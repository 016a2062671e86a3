//! Task CRUD tools backed by a pluggable store.
//!
//! The store is a collaborator boundary; the in-memory implementation backs
//! tests and single-process use. Task tools have no gated side effects, so
//! they skip the permission engine, but creation and updates still publish
//! side-effect notifications for the UI.

use super::common::required_str;
use super::traits::{ExecutionContext, PermissionProbe, Tool};
use super::types::ToolResult;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Done,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub created_at: String,
    pub updated_at: String,
}

pub trait TaskStore: Send + Sync {
    fn create(&self, title: &str, description: Option<&str>) -> anyhow::Result<Task>;
    fn update_status(&self, id: &str, status: TaskStatus) -> anyhow::Result<Task>;
    fn list(&self) -> anyhow::Result<Vec<Task>>;
}

#[derive(Default)]
pub struct InMemoryTaskStore {
    tasks: Mutex<Vec<Task>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TaskStore for InMemoryTaskStore {
    fn create(&self, title: &str, description: Option<&str>) -> anyhow::Result<Task> {
        let now = chrono::Utc::now().to_rfc3339();
        let task = Task {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.to_string(),
            description: description.map(String::from),
            status: TaskStatus::Todo,
            created_at: now.clone(),
            updated_at: now,
        };
        self.tasks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(task.clone());
        Ok(task)
    }

    fn update_status(&self, id: &str, status: TaskStatus) -> anyhow::Result<Task> {
        let mut tasks = self
            .tasks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let task = tasks
            .iter_mut()
            .find(|task| task.id == id)
            .ok_or_else(|| anyhow::anyhow!("task '{id}' not found"))?;
        task.status = status;
        task.updated_at = chrono::Utc::now().to_rfc3339();
        Ok(task.clone())
    }

    fn list(&self) -> anyhow::Result<Vec<Task>> {
        Ok(self
            .tasks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone())
    }
}

// ── Tools ───────────────────────────────────────────────────────────────────

pub struct TaskCreateTool {
    store: Arc<dyn TaskStore>,
}

impl TaskCreateTool {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }
}

impl Tool for TaskCreateTool {
    fn name(&self) -> &str {
        "task_create"
    }

    fn description(&self) -> &str {
        "Create a new task"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "title": { "type": "string", "description": "Task title" },
                "description": { "type": "string", "description": "Optional details" }
            },
            "required": ["title"]
        })
    }

    fn permission_probe(&self, _input: &Value) -> Option<PermissionProbe> {
        None
    }

    fn execute<'a>(
        &'a self,
        input: Value,
        _ctx: &'a ExecutionContext,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ToolResult>> + Send + 'a>> {
        Box::pin(async move {
            let title = match required_str(&input, "title") {
                Ok(title) => title,
                Err(error) => return Ok(ToolResult::error(error.to_string())),
            };
            let description = input.get("description").and_then(Value::as_str);
            let task = self.store.create(title, description)?;
            Ok(ToolResult::ok(serde_json::to_string(&task)?))
        })
    }

    fn side_effect_summary(&self, input: &Value, _result: &ToolResult) -> Option<String> {
        let title = input.get("title").and_then(Value::as_str)?;
        Some(format!("task created: {title}"))
    }
}

pub struct TaskUpdateTool {
    store: Arc<dyn TaskStore>,
}

impl TaskUpdateTool {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }
}

impl Tool for TaskUpdateTool {
    fn name(&self) -> &str {
        "task_update"
    }

    fn description(&self) -> &str {
        "Update a task's status"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "id": { "type": "string", "description": "Task id" },
                "status": {
                    "type": "string",
                    "enum": ["todo", "in_progress", "done"],
                    "description": "New status"
                }
            },
            "required": ["id", "status"]
        })
    }

    fn permission_probe(&self, _input: &Value) -> Option<PermissionProbe> {
        None
    }

    fn execute<'a>(
        &'a self,
        input: Value,
        _ctx: &'a ExecutionContext,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ToolResult>> + Send + 'a>> {
        Box::pin(async move {
            let id = match required_str(&input, "id") {
                Ok(id) => id,
                Err(error) => return Ok(ToolResult::error(error.to_string())),
            };
            let status: TaskStatus = match input
                .get("status")
                .cloned()
                .map(serde_json::from_value)
                .transpose()
            {
                Ok(Some(status)) => status,
                Ok(None) => return Ok(ToolResult::error("missing required argument 'status'")),
                Err(error) => return Ok(ToolResult::error(format!("invalid status: {error}"))),
            };

            match self.store.update_status(id, status) {
                Ok(task) => Ok(ToolResult::ok(serde_json::to_string(&task)?)),
                Err(error) => Ok(ToolResult::error(error.to_string())),
            }
        })
    }

    fn side_effect_summary(&self, input: &Value, _result: &ToolResult) -> Option<String> {
        let id = input.get("id").and_then(Value::as_str)?;
        let status = input.get("status").and_then(Value::as_str)?;
        Some(format!("task {id} moved to {status}"))
    }
}

pub struct TaskListTool {
    store: Arc<dyn TaskStore>,
}

impl TaskListTool {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }
}

impl Tool for TaskListTool {
    fn name(&self) -> &str {
        "task_list"
    }

    fn description(&self) -> &str {
        "List all tasks"
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    fn permission_probe(&self, _input: &Value) -> Option<PermissionProbe> {
        None
    }

    fn execute<'a>(
        &'a self,
        _input: Value,
        _ctx: &'a ExecutionContext,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ToolResult>> + Send + 'a>> {
        Box::pin(async move {
            let tasks = self.store.list()?;
            Ok(ToolResult::ok(serde_json::to_string(&tasks)?))
        })
    }
}
