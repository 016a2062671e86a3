use super::traits::{ExecutionContext, Tool};
use super::types::ToolSpec;
use std::collections::HashMap;
use std::sync::Arc;

/// Central registry for tool instances.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let tool: Arc<dyn Tool> = Arc::from(tool);
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Remove a tool by name. Returns whether it was present.
    pub fn unregister(&mut self, name: &str) -> bool {
        self.tools.remove(name).is_some()
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Return sorted list of registered tool names.
    pub fn tool_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Return specs for all registered tools, sorted by name so provider
    /// requests are deterministic.
    pub fn specs(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self.tools.values().map(|tool| tool.spec()).collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    /// Return specs filtered by the execution context's allowed-tools set.
    pub fn specs_for_context(&self, ctx: &ExecutionContext) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self
            .tools
            .iter()
            .filter(|(name, _)| ctx.tool_enabled(name))
            .map(|(_, tool)| tool.spec())
            .collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::types::ToolResult;
    use serde_json::{Value, json};
    use std::path::PathBuf;

    #[derive(Debug)]
    struct TestTool;

    impl Tool for TestTool {
        fn name(&self) -> &str {
            "test_tool"
        }

        fn description(&self) -> &str {
            "test"
        }

        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }

        fn permission_probe(&self, _input: &Value) -> Option<super::super::traits::PermissionProbe> {
            None
        }

        fn execute<'a>(
            &'a self,
            _input: Value,
            _ctx: &'a ExecutionContext,
        ) -> std::pin::Pin<
            Box<dyn std::future::Future<Output = anyhow::Result<ToolResult>> + Send + 'a>,
        > {
            Box::pin(async move { Ok(ToolResult::ok("ok")) })
        }
    }

    #[test]
    fn register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(TestTool));
        assert!(registry.get("test_tool").is_some());
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.tool_names(), vec!["test_tool"]);
    }

    #[test]
    fn unregister_removes_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(TestTool));
        assert!(registry.unregister("test_tool"));
        assert!(!registry.unregister("test_tool"));
    }

    #[test]
    fn specs_for_context_filters_allowed_tools() {
        let mut ctx = ExecutionContext::new("ws-1", "chat-1", PathBuf::from("/tmp"));
        ctx.allowed_tools = Some(std::collections::HashSet::from(["other".to_string()]));

        let mut registry = ToolRegistry::new();
        registry.register(Box::new(TestTool));

        assert!(registry.specs_for_context(&ctx).is_empty());
        ctx.allowed_tools = None;
        assert_eq!(registry.specs_for_context(&ctx).len(), 1);
    }
}
