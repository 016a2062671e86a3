//! Interactive approval with a hard timeout.
//!
//! Each escalation becomes a single-shot channel keyed by request id, raced
//! against a timer. Whichever side fires first resolves the request; the
//! loser finds the channel gone and is ignored, so a request can never be
//! resolved twice.

use super::store::PermissionStore;
use super::types::{
    ApprovalRequest, ApprovalResponse, ApprovalStatus, MemoryDecision, PermissionContext,
    PermissionDecision, PermissionMemory,
};
use crate::events::{EventBus, UiEvent};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

pub struct ApprovalGate {
    store: Arc<dyn PermissionStore>,
    bus: EventBus,
    timeout: Duration,
    pending: Mutex<HashMap<String, oneshot::Sender<ApprovalResponse>>>,
}

impl ApprovalGate {
    pub fn new(store: Arc<dyn PermissionStore>, bus: EventBus, timeout: Duration) -> Self {
        Self {
            store,
            bus,
            timeout,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Escalate one operation to a human and block until a response or the
    /// timeout, whichever comes first.
    pub async fn request_approval(&self, context: &PermissionContext) -> PermissionDecision {
        // Fail closed when nobody is listening; a wait could never resolve.
        if self.bus.subscriber_count() == 0 {
            return PermissionDecision::deny("no approval channel available");
        }

        let request = ApprovalRequest {
            id: uuid::Uuid::new_v4().to_string(),
            workspace_id: context.workspace_id.clone(),
            agent_id: context.agent_id.clone(),
            category: context.category,
            operation: context.operation.clone(),
            details: context.details.clone(),
            status: ApprovalStatus::Pending,
        };
        if let Err(error) = self.store.create_approval_request(&request) {
            tracing::warn!(%error, "failed to persist approval request");
            return PermissionDecision::deny(format!("approval store unavailable: {error}"));
        }

        let (sender, receiver) = oneshot::channel();
        self.pending
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(request.id.clone(), sender);

        self.bus.publish(UiEvent::ApprovalRequested {
            id: request.id.clone(),
            category: context.category.to_string(),
            operation: context.operation.clone(),
            details: context.details.clone(),
        });

        tokio::select! {
            response = receiver => match response {
                Ok(response) => self.conclude(&request, &response),
                // Sender dropped without a response, e.g. gate shutdown.
                Err(_) => {
                    self.mark(&request.id, ApprovalStatus::Denied);
                    PermissionDecision::deny("approval channel closed")
                }
            },
            () = tokio::time::sleep(self.timeout) => {
                self.pending
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .remove(&request.id);
                self.mark(&request.id, ApprovalStatus::Denied);
                tracing::info!(
                    request_id = %request.id,
                    operation = %context.operation,
                    "approval request timed out"
                );
                PermissionDecision::deny("timed out")
            }
        }
    }

    /// Deliver a human response. Returns false when the request is unknown
    /// or already resolved (a late answer after timeout).
    pub fn resolve(&self, response: ApprovalResponse) -> bool {
        let sender = self
            .pending
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(&response.id);
        match sender {
            Some(sender) => sender.send(response).is_ok(),
            None => {
                tracing::debug!(request_id = %response.id, "response for unknown or resolved request");
                false
            }
        }
    }

    fn conclude(
        &self,
        request: &ApprovalRequest,
        response: &ApprovalResponse,
    ) -> PermissionDecision {
        let status = if response.approved {
            ApprovalStatus::Approved
        } else {
            ApprovalStatus::Denied
        };
        self.mark(&request.id, status);

        if response.remember {
            if let Some(pattern) = response.pattern.as_deref().filter(|p| !p.trim().is_empty()) {
                let row = PermissionMemory {
                    workspace_id: request.workspace_id.clone(),
                    agent_id: request.agent_id.clone(),
                    category: request.category,
                    operation_pattern: pattern.to_string(),
                    decision: if response.approved {
                        MemoryDecision::Allow
                    } else {
                        MemoryDecision::Deny
                    },
                    created_at: chrono::Utc::now().to_rfc3339(),
                };
                if let Err(error) = self.store.create_memory(row) {
                    tracing::warn!(%error, "failed to persist remembered decision");
                }
            } else {
                tracing::warn!(
                    request_id = %request.id,
                    "remember flag set without a pattern; nothing persisted"
                );
            }
        }

        if response.approved {
            PermissionDecision::allow()
        } else {
            PermissionDecision::deny("user denied")
        }
    }

    fn mark(&self, id: &str, status: ApprovalStatus) {
        if let Err(error) = self.store.update_approval_status(id, status) {
            tracing::warn!(request_id = %id, %error, "failed to update approval status");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::store::InMemoryPermissionStore;
    use crate::permissions::types::PermissionCategory;

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

    fn gate_with(
        timeout: Duration,
    ) -> (Arc<InMemoryPermissionStore>, EventBus, Arc<ApprovalGate>) {
        let store = Arc::new(InMemoryPermissionStore::new());
        let bus = EventBus::new();
        let gate = Arc::new(ApprovalGate::new(
            store.clone() as Arc<dyn PermissionStore>,
            bus.clone(),
            timeout,
        ));
        (store, bus, gate)
    }

    async fn next_request_id(rx: &mut tokio::sync::broadcast::Receiver<UiEvent>) -> String {
        loop {
            match rx.recv().await.expect("bus event") {
                UiEvent::ApprovalRequested { id, .. } => return id,
                _ => continue,
            }
        }
    }

    #[tokio::test]
    async fn fails_closed_without_subscribers() {
        let (_, _, gate) = gate_with(Duration::from_secs(1));
        let decision = gate.request_approval(&bash_context("ls")).await;
        assert!(!decision.allowed);
        assert_eq!(
            decision.reason.as_deref(),
            Some("no approval channel available")
        );
    }

    #[tokio::test]
    async fn approval_resolves_allow() {
        let (store, bus, gate) = gate_with(Duration::from_secs(5));
        let mut rx = bus.subscribe();

        let responder = {
            let gate = gate.clone();
            tokio::spawn(async move {
                let id = next_request_id(&mut rx).await;
                assert!(gate.resolve(ApprovalResponse {
                    id: id.clone(),
                    approved: true,
                    remember: false,
                    pattern: None,
                }));
                id
            })
        };

        let decision = gate.request_approval(&bash_context("ls")).await;
        assert!(decision.allowed);
        let id = responder.await.unwrap();
        assert_eq!(store.approval_status(&id), Some(ApprovalStatus::Approved));
    }

    #[tokio::test]
    async fn denial_carries_reason() {
        let (_, bus, gate) = gate_with(Duration::from_secs(5));
        let mut rx = bus.subscribe();

        let gate_clone = gate.clone();
        tokio::spawn(async move {
            let id = next_request_id(&mut rx).await;
            gate_clone.resolve(ApprovalResponse {
                id,
                approved: false,
                remember: false,
                pattern: None,
            });
        });

        let decision = gate.request_approval(&bash_context("rm -rf /")).await;
        assert!(!decision.allowed);
        assert_eq!(decision.reason.as_deref(), Some("user denied"));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_denies_exactly_once() {
        let (store, bus, gate) = gate_with(Duration::from_secs(300));
        let mut rx = bus.subscribe();

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.request_approval(&bash_context("ls")).await })
        };
        let id = next_request_id(&mut rx).await;

        // Paused clock: sleep jumps straight past the timeout.
        let decision = waiter.await.unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.reason.as_deref(), Some("timed out"));
        assert_eq!(store.approval_status(&id), Some(ApprovalStatus::Denied));

        // A late response is rejected and the status stays denied.
        assert!(!gate.resolve(ApprovalResponse {
            id: id.clone(),
            approved: true,
            remember: false,
            pattern: None,
        }));
        assert_eq!(store.approval_status(&id), Some(ApprovalStatus::Denied));
    }

    #[tokio::test]
    async fn remember_persists_memory_row() {
        let (store, bus, gate) = gate_with(Duration::from_secs(5));
        let mut rx = bus.subscribe();

        let gate_clone = gate.clone();
        tokio::spawn(async move {
            let id = next_request_id(&mut rx).await;
            gate_clone.resolve(ApprovalResponse {
                id,
                approved: true,
                remember: true,
                pattern: Some("cargo *".to_string()),
            });
        });

        let decision = gate.request_approval(&bash_context("cargo test")).await;
        assert!(decision.allowed);

        let rows = store
            .memory_rows("ws-1", None, PermissionCategory::Bash)
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].operation_pattern, "cargo *");
        assert_eq!(rows[0].decision, MemoryDecision::Allow);
    }

    #[tokio::test]
    async fn resolve_unknown_request_returns_false() {
        let (_, _, gate) = gate_with(Duration::from_secs(1));
        assert!(!gate.resolve(ApprovalResponse {
            id: "nope".to_string(),
            approved: true,
            remember: false,
            pattern: None,
        }));
    }
}
