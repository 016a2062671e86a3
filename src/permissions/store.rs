//! Policy persistence boundary.
//!
//! The engine and gate only touch storage through [`PermissionStore`].
//! [`InMemoryPermissionStore`] backs tests and ephemeral sessions;
//! [`FilePermissionStore`] adds durable memory rows in the workspace's
//! `permissions.toml` while keeping the volatile state (modes, session rules,
//! pending approvals) in memory.

use super::types::{
    ApprovalRequest, ApprovalStatus, PermissionCategory, PermissionMemory, PermissionMode,
    SessionRule,
};
use crate::error::PermissionError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub trait PermissionStore: Send + Sync {
    fn workspace_mode(&self, workspace_id: &str) -> Result<PermissionMode, PermissionError>;

    fn agent_mode(&self, agent_id: &str) -> Result<PermissionMode, PermissionError>;

    /// Memory rows applicable to one lookup: workspace-wide rows plus rows
    /// scoped to the given agent, in creation order.
    fn memory_rows(
        &self,
        workspace_id: &str,
        agent_id: Option<&str>,
        category: PermissionCategory,
    ) -> Result<Vec<PermissionMemory>, PermissionError>;

    fn create_memory(&self, row: PermissionMemory) -> Result<(), PermissionError>;

    fn session_rules(
        &self,
        chat_id: &str,
        category: PermissionCategory,
    ) -> Result<Vec<SessionRule>, PermissionError>;

    fn create_approval_request(&self, request: &ApprovalRequest) -> Result<(), PermissionError>;

    /// Transition a request out of `pending`. A request already resolved is
    /// left untouched, which is what makes late responses harmless.
    fn update_approval_status(
        &self,
        id: &str,
        status: ApprovalStatus,
    ) -> Result<(), PermissionError>;
}

// ── In-memory store ─────────────────────────────────────────────────────────

#[derive(Default)]
pub struct InMemoryPermissionStore {
    workspace_modes: Mutex<HashMap<String, PermissionMode>>,
    agent_modes: Mutex<HashMap<String, PermissionMode>>,
    memories: Mutex<Vec<PermissionMemory>>,
    rules: Mutex<Vec<SessionRule>>,
    approvals: Mutex<HashMap<String, ApprovalRequest>>,
}

impl InMemoryPermissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_workspace_mode(&self, workspace_id: &str, mode: PermissionMode) {
        self.workspace_modes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(workspace_id.to_string(), mode);
    }

    pub fn set_agent_mode(&self, agent_id: &str, mode: PermissionMode) {
        self.agent_modes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(agent_id.to_string(), mode);
    }

    pub fn add_session_rule(&self, rule: SessionRule) {
        self.rules
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(rule);
    }

    /// Current status of a request, for tests and UI listings.
    pub fn approval_status(&self, id: &str) -> Option<ApprovalStatus> {
        self.approvals
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(id)
            .map(|request| request.status)
    }
}

impl PermissionStore for InMemoryPermissionStore {
    fn workspace_mode(&self, workspace_id: &str) -> Result<PermissionMode, PermissionError> {
        Ok(self
            .workspace_modes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(workspace_id)
            .copied()
            .unwrap_or_default())
    }

    fn agent_mode(&self, agent_id: &str) -> Result<PermissionMode, PermissionError> {
        Ok(self
            .agent_modes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(agent_id)
            .copied()
            .unwrap_or(PermissionMode::Inherit))
    }

    fn memory_rows(
        &self,
        workspace_id: &str,
        agent_id: Option<&str>,
        category: PermissionCategory,
    ) -> Result<Vec<PermissionMemory>, PermissionError> {
        Ok(self
            .memories
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .filter(|row| {
                row.workspace_id == workspace_id
                    && row.category == category
                    && (row.agent_id.is_none() || row.agent_id.as_deref() == agent_id)
            })
            .cloned()
            .collect())
    }

    fn create_memory(&self, row: PermissionMemory) -> Result<(), PermissionError> {
        self.memories
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(row);
        Ok(())
    }

    fn session_rules(
        &self,
        chat_id: &str,
        category: PermissionCategory,
    ) -> Result<Vec<SessionRule>, PermissionError> {
        Ok(self
            .rules
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .filter(|rule| rule.chat_id == chat_id && rule.category == category)
            .cloned()
            .collect())
    }

    fn create_approval_request(&self, request: &ApprovalRequest) -> Result<(), PermissionError> {
        self.approvals
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(request.id.clone(), request.clone());
        Ok(())
    }

    fn update_approval_status(
        &self,
        id: &str,
        status: ApprovalStatus,
    ) -> Result<(), PermissionError> {
        let mut approvals = self
            .approvals
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        match approvals.get_mut(id) {
            Some(request) if request.status == ApprovalStatus::Pending => {
                request.status = status;
            }
            Some(request) => {
                tracing::debug!(
                    request_id = %id,
                    current = ?request.status,
                    "ignoring status update for resolved approval request"
                );
            }
            None => {
                return Err(PermissionError::Store(format!(
                    "unknown approval request '{id}'"
                )));
            }
        }
        Ok(())
    }
}

// ── File-backed store ───────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize, Default)]
struct MemoryFile {
    #[serde(default)]
    memories: Vec<PermissionMemory>,
}

/// Durable memory rows in `<workspace>/permissions.toml`; everything else
/// delegates to an in-memory store since modes, session rules, and pending
/// approvals are per-process state.
pub struct FilePermissionStore {
    volatile: InMemoryPermissionStore,
    records: Mutex<Vec<PermissionMemory>>,
    store_path: PathBuf,
}

impl FilePermissionStore {
    pub fn load(workspace_dir: &Path) -> Self {
        let store_path = workspace_dir.join("permissions.toml");
        let file = match fs::read_to_string(&store_path) {
            Ok(content) if content.trim().is_empty() => MemoryFile::default(),
            Ok(content) => toml::from_str(&content).unwrap_or_else(|error| {
                tracing::warn!(
                    path = %store_path.display(),
                    %error,
                    "failed to parse permissions.toml; starting with empty memory"
                );
                MemoryFile::default()
            }),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => MemoryFile::default(),
            Err(error) => {
                tracing::warn!(
                    path = %store_path.display(),
                    %error,
                    "failed to read permissions.toml; starting with empty memory"
                );
                MemoryFile::default()
            }
        };

        Self {
            volatile: InMemoryPermissionStore::new(),
            records: Mutex::new(file.memories),
            store_path,
        }
    }

    pub fn volatile(&self) -> &InMemoryPermissionStore {
        &self.volatile
    }

    fn persist(&self, memories: &[PermissionMemory]) -> Result<(), PermissionError> {
        let content = toml::to_string(&MemoryFile {
            memories: memories.to_vec(),
        })
        .map_err(|error| PermissionError::Store(error.to_string()))?;

        if let Some(parent) = self.store_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|error| PermissionError::Store(error.to_string()))?;
        }
        fs::write(&self.store_path, content)
            .map_err(|error| PermissionError::Store(error.to_string()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.store_path, fs::Permissions::from_mode(0o600))
                .map_err(|error| PermissionError::Store(error.to_string()))?;
        }

        Ok(())
    }
}

impl PermissionStore for FilePermissionStore {
    fn workspace_mode(&self, workspace_id: &str) -> Result<PermissionMode, PermissionError> {
        self.volatile.workspace_mode(workspace_id)
    }

    fn agent_mode(&self, agent_id: &str) -> Result<PermissionMode, PermissionError> {
        self.volatile.agent_mode(agent_id)
    }

    fn memory_rows(
        &self,
        workspace_id: &str,
        agent_id: Option<&str>,
        category: PermissionCategory,
    ) -> Result<Vec<PermissionMemory>, PermissionError> {
        Ok(self
            .records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .filter(|row| {
                row.workspace_id == workspace_id
                    && row.category == category
                    && (row.agent_id.is_none() || row.agent_id.as_deref() == agent_id)
            })
            .cloned()
            .collect())
    }

    fn create_memory(&self, row: PermissionMemory) -> Result<(), PermissionError> {
        let mut records = self
            .records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        // Persist first; the in-memory view only advances on success.
        let mut next = records.clone();
        next.push(row);
        self.persist(&next)?;
        *records = next;
        Ok(())
    }

    fn session_rules(
        &self,
        chat_id: &str,
        category: PermissionCategory,
    ) -> Result<Vec<SessionRule>, PermissionError> {
        self.volatile.session_rules(chat_id, category)
    }

    fn create_approval_request(&self, request: &ApprovalRequest) -> Result<(), PermissionError> {
        self.volatile.create_approval_request(request)
    }

    fn update_approval_status(
        &self,
        id: &str,
        status: ApprovalStatus,
    ) -> Result<(), PermissionError> {
        self.volatile.update_approval_status(id, status)
    }
}
