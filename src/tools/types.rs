use serde::{Deserialize, Serialize};

/// Uniform result envelope for a tool execution. Terminal once produced;
/// failure is a value here, never an exception that aborts the loop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolResult {
    /// Serialized payload on success, or an error description.
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

/// Description of a tool for the LLM
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_set_error_flag() {
        assert!(!ToolResult::ok("done").is_error);
        assert!(ToolResult::error("boom").is_error);
    }

    #[test]
    fn tool_result_serde_round_trip() {
        let result = ToolResult::error("file not found");
        let json = serde_json::to_string(&result).unwrap();
        let decoded: ToolResult = serde_json::from_str(&json).unwrap();
        assert_eq!(result, decoded);
    }
}
