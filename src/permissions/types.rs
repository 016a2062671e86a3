use serde::{Deserialize, Serialize};

/// Side-effect category a tool invocation falls under. Policy is keyed by
/// category, never by tool name, so new tools inherit existing decisions.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PermissionCategory {
    Bash,
    Git,
    FileWrite,
    FileRead,
    Network,
    Mcp,
}

/// Coarse policy mode for a workspace or agent.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum PermissionMode {
    /// Read-only: only `file_read` operations are allowed.
    Safe,
    /// Escalate through memory, session rules, then interactive approval.
    Ask,
    AllowAll,
    /// Agent-level only: defer to the workspace mode.
    Inherit,
}

impl Default for PermissionMode {
    fn default() -> Self {
        Self::Ask
    }
}

/// Everything the engine needs to judge one tool invocation. Built per call,
/// never persisted.
#[derive(Debug, Clone)]
pub struct PermissionContext {
    pub workspace_id: String,
    pub chat_id: String,
    pub agent_id: Option<String>,
    pub category: PermissionCategory,
    /// Free-text operation identifier, e.g. a command line or file path.
    pub operation: String,
    pub details: Option<String>,
}

/// Outcome of a permission check. Denial is a value, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionDecision {
    pub allowed: bool,
    pub reason: Option<String>,
}

impl PermissionDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
        }
    }
}

/// Durable cached decision, created only when a user opts to remember an
/// approval response. Never auto-expires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionMemory {
    pub workspace_id: String,
    pub agent_id: Option<String>,
    pub category: PermissionCategory,
    /// Glob pattern (`*`, `?`) matched anchored and case-insensitively.
    pub operation_pattern: String,
    pub decision: MemoryDecision,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryDecision {
    Allow,
    Deny,
}

/// Chat-scoped rule checked after memory, before interactive approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRule {
    pub chat_id: String,
    pub category: PermissionCategory,
    /// `None` matches any operation in the category.
    pub pattern: Option<String>,
    pub action: RuleAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    Allow,
    Deny,
    /// Fall through to interactive approval.
    Ask,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Denied,
}

/// A pending escalation. Resolves exactly once, by response or timeout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: String,
    pub workspace_id: String,
    pub agent_id: Option<String>,
    pub category: PermissionCategory,
    pub operation: String,
    pub details: Option<String>,
    pub status: ApprovalStatus,
}

/// The human's answer to an [`ApprovalRequest`], delivered by the UI
/// collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalResponse {
    pub id: String,
    pub approved: bool,
    /// Persist the decision as a [`PermissionMemory`] row.
    #[serde(default)]
    pub remember: bool,
    /// Pattern for the remembered row; required for `remember` to take
    /// effect.
    #[serde(default)]
    pub pattern: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn mode_parses_kebab_case() {
        assert_eq!(
            PermissionMode::from_str("allow-all").unwrap(),
            PermissionMode::AllowAll
        );
        assert_eq!(PermissionMode::from_str("safe").unwrap(), PermissionMode::Safe);
        assert!(PermissionMode::from_str("yolo").is_err());
    }

    #[test]
    fn category_display_is_snake_case() {
        assert_eq!(PermissionCategory::FileWrite.to_string(), "file_write");
        assert_eq!(PermissionCategory::Mcp.to_string(), "mcp");
    }

    #[test]
    fn decision_constructors() {
        assert!(PermissionDecision::allow().allowed);
        let denied = PermissionDecision::deny("Safe Mode");
        assert!(!denied.allowed);
        assert_eq!(denied.reason.as_deref(), Some("Safe Mode"));
    }

    #[test]
    fn approval_response_defaults_remember_off() {
        let response: ApprovalResponse =
            serde_json::from_str(r#"{"id":"r1","approved":true}"#).unwrap();
        assert!(response.approved);
        assert!(!response.remember);
        assert!(response.pattern.is_none());
    }
}
