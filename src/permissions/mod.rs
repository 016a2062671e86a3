pub mod approval;
pub mod engine;
pub mod pattern;
pub mod store;
pub mod types;

pub use approval::ApprovalGate;
pub use engine::PermissionEngine;
pub use pattern::operation_matches;
pub use store::{FilePermissionStore, InMemoryPermissionStore, PermissionStore};
pub use types::{
    ApprovalRequest, ApprovalResponse, ApprovalStatus, MemoryDecision, PermissionCategory,
    PermissionContext, PermissionDecision, PermissionMemory, PermissionMode, RuleAction,
    SessionRule,
};
