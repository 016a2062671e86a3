//! Policy resolution for one tool invocation.
//!
//! Precedence under `ask` is fixed: remembered decisions, then session
//! rules, then interactive approval. Memory wins over rules because it is a
//! user's explicit standing decision; rules are scoped defaults.

use super::approval::ApprovalGate;
use super::pattern::operation_matches;
use super::store::PermissionStore;
use super::types::{
    MemoryDecision, PermissionCategory, PermissionContext, PermissionDecision, PermissionMode,
    RuleAction,
};
use std::sync::Arc;

pub struct PermissionEngine {
    store: Arc<dyn PermissionStore>,
    gate: Arc<ApprovalGate>,
}

impl PermissionEngine {
    pub fn new(store: Arc<dyn PermissionStore>, gate: Arc<ApprovalGate>) -> Self {
        Self { store, gate }
    }

    pub fn gate(&self) -> &Arc<ApprovalGate> {
        &self.gate
    }

    pub async fn check(&self, context: &PermissionContext) -> PermissionDecision {
        let mode = match self.effective_mode(context) {
            Ok(mode) => mode,
            Err(error) => {
                tracing::warn!(%error, "permission store unavailable; denying");
                return PermissionDecision::deny(format!("permission store unavailable: {error}"));
            }
        };

        match mode {
            PermissionMode::AllowAll => PermissionDecision::allow(),
            PermissionMode::Safe => {
                if context.category == PermissionCategory::FileRead {
                    PermissionDecision::allow()
                } else {
                    PermissionDecision::deny(format!(
                        "Safe Mode blocks {} operations",
                        context.category
                    ))
                }
            }
            // Inherit resolves to the workspace mode in effective_mode; at
            // this point it can only mean "no mode configured anywhere".
            PermissionMode::Ask | PermissionMode::Inherit => self.escalate(context).await,
        }
    }

    /// Agent mode wins unless it is `inherit`; then the workspace mode; the
    /// default is `ask`.
    fn effective_mode(
        &self,
        context: &PermissionContext,
    ) -> Result<PermissionMode, crate::error::PermissionError> {
        if let Some(agent_id) = context.agent_id.as_deref() {
            let agent_mode = self.store.agent_mode(agent_id)?;
            if agent_mode != PermissionMode::Inherit {
                return Ok(agent_mode);
            }
        }
        self.store.workspace_mode(&context.workspace_id)
    }

    async fn escalate(&self, context: &PermissionContext) -> PermissionDecision {
        if let Some(decision) = self.check_memory(context) {
            return decision;
        }
        if let Some(decision) = self.check_session_rules(context) {
            return decision;
        }
        self.gate.request_approval(context).await
    }

    fn check_memory(&self, context: &PermissionContext) -> Option<PermissionDecision> {
        let rows = match self.store.memory_rows(
            &context.workspace_id,
            context.agent_id.as_deref(),
            context.category,
        ) {
            Ok(rows) => rows,
            Err(error) => {
                tracing::warn!(%error, "failed to read permission memory; skipping");
                return None;
            }
        };

        rows.iter()
            .find(|row| operation_matches(&row.operation_pattern, &context.operation))
            .map(|row| match row.decision {
                MemoryDecision::Allow => PermissionDecision::allow(),
                MemoryDecision::Deny => PermissionDecision::deny(format!(
                    "denied by remembered decision ({})",
                    row.operation_pattern
                )),
            })
    }

    fn check_session_rules(&self, context: &PermissionContext) -> Option<PermissionDecision> {
        let rules = match self
            .store
            .session_rules(&context.chat_id, context.category)
        {
            Ok(rules) => rules,
            Err(error) => {
                tracing::warn!(%error, "failed to read session rules; skipping");
                return None;
            }
        };

        // A rule with no pattern matches anything in its category.
        let matched = rules.iter().find(|rule| {
            rule.pattern
                .as_deref()
                .is_none_or(|pattern| operation_matches(pattern, &context.operation))
        })?;

        match matched.action {
            RuleAction::Allow => Some(PermissionDecision::allow()),
            RuleAction::Deny => Some(PermissionDecision::deny("denied by session rule")),
            RuleAction::Ask => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::permissions::store::InMemoryPermissionStore;
    use crate::permissions::types::{PermissionMemory, SessionRule};
    use std::time::Duration;

    fn engine_with_store() -> (Arc<InMemoryPermissionStore>, PermissionEngine) {
        let store = Arc::new(InMemoryPermissionStore::new());
        let gate = Arc::new(ApprovalGate::new(
            store.clone() as Arc<dyn PermissionStore>,
            EventBus::new(),
            Duration::from_secs(1),
        ));
        let engine = PermissionEngine::new(store.clone() as Arc<dyn PermissionStore>, gate);
        (store, engine)
    }

    fn bash_context(operation: &str) -> PermissionContext {
        PermissionContext {
            workspace_id: "ws-1".to_string(),
            chat_id: "chat-1".to_string(),
            agent_id: None,
            category: PermissionCategory::Bash,
            operation: operation.to_string(),
            details: None,
        }
    }

    fn bash_memory(pattern: &str, decision: MemoryDecision) -> PermissionMemory {
        PermissionMemory {
            workspace_id: "ws-1".to_string(),
            agent_id: None,
            category: PermissionCategory::Bash,
            operation_pattern: pattern.to_string(),
            decision,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    #[tokio::test]
    async fn allow_all_short_circuits() {
        let (store, engine) = engine_with_store();
        store.set_workspace_mode("ws-1", PermissionMode::AllowAll);
        assert!(engine.check(&bash_context("rm -rf /")).await.allowed);
    }

    #[tokio::test]
    async fn safe_mode_allows_only_file_read() {
        let (store, engine) = engine_with_store();
        store.set_workspace_mode("ws-1", PermissionMode::Safe);

        let mut read = bash_context("notes.md");
        read.category = PermissionCategory::FileRead;
        assert!(engine.check(&read).await.allowed);

        let mut write = bash_context("notes.md");
        write.category = PermissionCategory::FileWrite;
        let decision = engine.check(&write).await;
        assert!(!decision.allowed);
        assert!(decision.reason.unwrap().contains("Safe Mode"));
    }

    #[tokio::test]
    async fn safe_mode_denial_is_idempotent() {
        let (store, engine) = engine_with_store();
        store.set_workspace_mode("ws-1", PermissionMode::Safe);

        let first = engine.check(&bash_context("ls")).await;
        let second = engine.check(&bash_context("ls")).await;
        assert_eq!(first, second);
        assert!(!first.allowed);
    }

    #[tokio::test]
    async fn memory_wins_over_session_rule() {
        let (store, engine) = engine_with_store();
        store
            .create_memory(bash_memory("rm *", MemoryDecision::Deny))
            .unwrap();
        store.add_session_rule(SessionRule {
            chat_id: "chat-1".to_string(),
            category: PermissionCategory::Bash,
            pattern: Some("rm *".to_string()),
            action: RuleAction::Allow,
        });

        let decision = engine.check(&bash_context("rm notes.md")).await;
        assert!(!decision.allowed);
        assert!(decision.reason.unwrap().contains("remembered"));
    }

    #[tokio::test]
    async fn session_rule_without_pattern_matches_category() {
        let (store, engine) = engine_with_store();
        store.add_session_rule(SessionRule {
            chat_id: "chat-1".to_string(),
            category: PermissionCategory::Bash,
            pattern: None,
            action: RuleAction::Allow,
        });
        assert!(engine.check(&bash_context("anything")).await.allowed);
    }

    #[tokio::test]
    async fn ask_rule_falls_through_to_gate() {
        let (store, engine) = engine_with_store();
        store.add_session_rule(SessionRule {
            chat_id: "chat-1".to_string(),
            category: PermissionCategory::Bash,
            pattern: None,
            action: RuleAction::Ask,
        });
        // No subscribers on the bus, so the gate fails closed.
        let decision = engine.check(&bash_context("ls")).await;
        assert_eq!(
            decision.reason.as_deref(),
            Some("no approval channel available")
        );
    }

    #[tokio::test]
    async fn agent_mode_overrides_workspace() {
        let (store, engine) = engine_with_store();
        store.set_workspace_mode("ws-1", PermissionMode::Safe);
        store.set_agent_mode("agent-1", PermissionMode::AllowAll);

        let mut context = bash_context("rm -rf /");
        context.agent_id = Some("agent-1".to_string());
        assert!(engine.check(&context).await.allowed);
    }

    #[tokio::test]
    async fn inherit_agent_uses_workspace_mode() {
        let (store, engine) = engine_with_store();
        store.set_workspace_mode("ws-1", PermissionMode::AllowAll);
        store.set_agent_mode("agent-1", PermissionMode::Inherit);

        let mut context = bash_context("ls");
        context.agent_id = Some("agent-1".to_string());
        assert!(engine.check(&context).await.allowed);
    }

    #[tokio::test]
    async fn unmatched_operation_reaches_gate() {
        let (store, engine) = engine_with_store();
        store
            .create_memory(bash_memory("cargo *", MemoryDecision::Allow))
            .unwrap();
        // Operation does not match the row, and no channel is attached.
        let decision = engine.check(&bash_context("git push")).await;
        assert!(!decision.allowed);
    }
}
