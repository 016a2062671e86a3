pub mod common;
pub mod executor;
pub mod file_read;
pub mod file_write;
pub mod registry;
pub mod tasks;
pub mod traits;
pub mod types;

pub use common::resolve_workspace_path;
pub use executor::ToolExecutor;
pub use file_read::FileReadTool;
pub use file_write::FileWriteTool;
pub use registry::ToolRegistry;
pub use tasks::{
    InMemoryTaskStore, Task, TaskCreateTool, TaskListTool, TaskStatus, TaskStore, TaskUpdateTool,
};
pub use traits::{ExecutionContext, PermissionProbe, Tool};
pub use types::{ToolResult, ToolSpec};

use crate::events::EventBus;
use crate::permissions::PermissionEngine;
use std::sync::Arc;

/// Build the default registry: file tools plus task tools sharing one store.
pub fn default_registry(task_store: Arc<dyn TaskStore>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(FileReadTool));
    registry.register(Box::new(FileWriteTool));
    registry.register(Box::new(TaskCreateTool::new(task_store.clone())));
    registry.register(Box::new(TaskUpdateTool::new(task_store.clone())));
    registry.register(Box::new(TaskListTool::new(task_store)));
    registry
}

/// Wire a registry into an executor with the given permission engine.
pub fn default_executor(
    registry: ToolRegistry,
    engine: Arc<PermissionEngine>,
    bus: EventBus,
) -> ToolExecutor {
    ToolExecutor::new(Arc::new(registry), engine, bus)
}
