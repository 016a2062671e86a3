//! Permission resolution through the public API: modes, precedence,
//! remembered decisions, and the approval gate's failure behavior.

use opspilot::events::{EventBus, UiEvent};
use opspilot::permissions::{
    ApprovalGate, ApprovalResponse, FilePermissionStore, InMemoryPermissionStore, MemoryDecision,
    PermissionCategory, PermissionContext, PermissionEngine, PermissionMemory, PermissionMode,
    PermissionStore, RuleAction, SessionRule, operation_matches,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn context(category: PermissionCategory, operation: &str) -> PermissionContext {
    PermissionContext {
        workspace_id: "ws-1".to_string(),
        chat_id: "chat-1".to_string(),
        agent_id: None,
        category,
        operation: operation.to_string(),
        details: None,
    }
}

fn engine_over(
    store: Arc<dyn PermissionStore>,
    bus: EventBus,
    timeout: Duration,
) -> (Arc<ApprovalGate>, PermissionEngine) {
    let gate = Arc::new(ApprovalGate::new(store.clone(), bus, timeout));
    let engine = PermissionEngine::new(store, gate.clone());
    (gate, engine)
}

/// Answer the next approval request on the bus with the given response.
fn answer_next(
    bus: &EventBus,
    gate: Arc<ApprovalGate>,
    approved: bool,
    remember: bool,
    pattern: Option<&str>,
) -> tokio::task::JoinHandle<()> {
    let mut rx = bus.subscribe();
    let pattern = pattern.map(str::to_string);
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            if let UiEvent::ApprovalRequested { id, .. } = event {
                assert!(gate.resolve(ApprovalResponse {
                    id,
                    approved,
                    remember,
                    pattern,
                }));
                return;
            }
        }
    })
}

#[tokio::test]
async fn memory_deny_beats_session_allow() {
    let store = Arc::new(InMemoryPermissionStore::new());
    store
        .create_memory(PermissionMemory {
            workspace_id: "ws-1".to_string(),
            agent_id: None,
            category: PermissionCategory::Bash,
            operation_pattern: "rm *".to_string(),
            decision: MemoryDecision::Deny,
            created_at: chrono::Utc::now().to_rfc3339(),
        })
        .unwrap();
    store.add_session_rule(SessionRule {
        chat_id: "chat-1".to_string(),
        category: PermissionCategory::Bash,
        pattern: Some("rm *".to_string()),
        action: RuleAction::Allow,
    });

    let (_, engine) = engine_over(store, EventBus::new(), Duration::from_secs(1));
    let decision = engine
        .check(&context(PermissionCategory::Bash, "rm scratch.txt"))
        .await;
    assert!(!decision.allowed);
    assert!(decision.reason.unwrap().contains("remembered"));
}

#[tokio::test]
async fn session_rule_answers_without_escalating() {
    let store = Arc::new(InMemoryPermissionStore::new());
    store.add_session_rule(SessionRule {
        chat_id: "chat-1".to_string(),
        category: PermissionCategory::Git,
        pattern: Some("git push*".to_string()),
        action: RuleAction::Deny,
    });

    // No bus subscriber: reaching the gate would fail closed with a
    // different reason, so the rule reason proves the rule decided.
    let (_, engine) = engine_over(store, EventBus::new(), Duration::from_secs(1));
    let decision = engine
        .check(&context(PermissionCategory::Git, "git push origin main"))
        .await;
    assert!(!decision.allowed);
    assert_eq!(decision.reason.as_deref(), Some("denied by session rule"));
}

#[tokio::test]
async fn safe_mode_blocks_everything_but_file_read() {
    let store = Arc::new(InMemoryPermissionStore::new());
    store.set_workspace_mode("ws-1", PermissionMode::Safe);
    let (_, engine) = engine_over(store, EventBus::new(), Duration::from_secs(1));

    assert!(
        engine
            .check(&context(PermissionCategory::FileRead, "notes.md"))
            .await
            .allowed
    );

    for category in [
        PermissionCategory::Bash,
        PermissionCategory::Git,
        PermissionCategory::FileWrite,
        PermissionCategory::Network,
        PermissionCategory::Mcp,
    ] {
        let decision = engine.check(&context(category, "anything")).await;
        assert!(!decision.allowed, "{category} must be blocked in safe mode");
        assert!(decision.reason.unwrap().contains("Safe Mode"));
    }
}

#[tokio::test]
async fn gate_fails_closed_without_a_listener() {
    let store = Arc::new(InMemoryPermissionStore::new());
    let (_, engine) = engine_over(store, EventBus::new(), Duration::from_secs(1));

    let decision = engine.check(&context(PermissionCategory::Bash, "ls")).await;
    assert!(!decision.allowed);
    assert_eq!(
        decision.reason.as_deref(),
        Some("no approval channel available")
    );
}

#[tokio::test(start_paused = true)]
async fn unanswered_request_times_out_to_denial() {
    let store = Arc::new(InMemoryPermissionStore::new());
    let bus = EventBus::new();
    let (_, engine) = engine_over(store, bus.clone(), Duration::from_secs(300));

    // Subscribed but silent: the timer must resolve the request.
    let _rx = bus.subscribe();
    let decision = engine.check(&context(PermissionCategory::Bash, "ls")).await;
    assert!(!decision.allowed);
    assert_eq!(decision.reason.as_deref(), Some("timed out"));
}

#[tokio::test]
async fn denied_request_is_denied_on_repeat() {
    let store = Arc::new(InMemoryPermissionStore::new());
    let bus = EventBus::new();
    let (gate, engine) = engine_over(store, bus.clone(), Duration::from_secs(5));

    let ctx = context(PermissionCategory::Bash, "rm -rf scratch");

    // Deny and remember a pattern covering the operation.
    let responder = answer_next(&bus, gate.clone(), false, true, Some("rm *"));
    let first = engine.check(&ctx).await;
    responder.await.unwrap();
    assert!(!first.allowed);

    // The second check never reaches the gate: the remembered denial
    // answers it even with no listener attached.
    let second = engine.check(&ctx).await;
    assert!(!second.allowed);
    assert!(second.reason.unwrap().contains("remembered"));
}

#[tokio::test]
async fn remembered_approval_skips_the_gate_and_survives_reload() {
    let workspace = TempDir::new().unwrap();
    let store = Arc::new(FilePermissionStore::load(workspace.path()));
    let bus = EventBus::new();
    let (gate, engine) = engine_over(store, bus.clone(), Duration::from_secs(5));

    let ctx = context(PermissionCategory::Bash, "cargo test");

    let responder = answer_next(&bus, gate.clone(), true, true, Some("cargo *"));
    assert!(engine.check(&ctx).await.allowed);
    responder.await.unwrap();

    // Same engine, no listener: memory answers.
    assert!(engine.check(&ctx).await.allowed);

    // Fresh store from the same directory: the row was persisted.
    let reloaded = Arc::new(FilePermissionStore::load(workspace.path()));
    let (_, engine) = engine_over(reloaded, EventBus::new(), Duration::from_secs(1));
    assert!(
        engine
            .check(&context(PermissionCategory::Bash, "cargo build"))
            .await
            .allowed
    );
    // A sibling operation outside the pattern still fails closed.
    assert!(
        !engine
            .check(&context(PermissionCategory::Bash, "rm -rf /"))
            .await
            .allowed
    );
}

#[tokio::test]
async fn approval_without_remember_escalates_again() {
    let store = Arc::new(InMemoryPermissionStore::new());
    let bus = EventBus::new();
    let (gate, engine) = engine_over(store, bus.clone(), Duration::from_secs(5));

    let ctx = context(PermissionCategory::Bash, "ls");

    let responder = answer_next(&bus, gate.clone(), true, false, None);
    assert!(engine.check(&ctx).await.allowed);
    responder.await.unwrap();

    // Nothing was remembered, so the second check escalates again and the
    // new answer stands on its own.
    let responder = answer_next(&bus, gate.clone(), false, false, None);
    let second = engine.check(&ctx).await;
    responder.await.unwrap();
    assert!(!second.allowed);
    assert_eq!(second.reason.as_deref(), Some("user denied"));
}

#[test]
fn glob_patterns_match_prefix_wildcards() {
    assert!(operation_matches("rm -rf *", "rm -rf /tmp/x"));
    assert!(!operation_matches("rm -rf *", "rm /tmp/x"));
}

#[test]
fn glob_patterns_are_case_insensitive() {
    assert!(operation_matches("GIT *", "git push"));
    assert!(operation_matches("git *", "GIT PUSH"));
}

#[test]
fn question_mark_matches_exactly_one_char() {
    assert!(operation_matches("cat file?.txt", "cat file1.txt"));
    assert!(!operation_matches("cat file?.txt", "cat file10.txt"));
}
