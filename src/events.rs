//! Broadcast event bus connecting the agent core to UI observers.
//!
//! The bus carries three families of events: streaming chunk mirrors for live
//! rendering, approval requests awaiting a human decision, and fire-and-forget
//! tool side-effect notifications. Everything except approval requests is
//! best-effort: publishing to a bus with no subscribers is not an error.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

const BUS_CAPACITY: usize = 256;

/// One streamed chunk mirrored from the agent loop's internal event stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamChunk {
    Text { text: String },
    Thinking { text: String },
    ToolUseStart { name: String },
    ToolResult { name: String, is_error: bool },
    Complete,
    Error { message: String },
}

/// A tool's observable side effect, published after the effect has happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolNotification {
    pub tool_name: String,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum UiEvent {
    Chunk {
        chat_id: String,
        chunk: StreamChunk,
    },
    ApprovalRequested {
        id: String,
        category: String,
        operation: String,
        details: Option<String>,
    },
    ToolSideEffect {
        chat_id: String,
        notification: ToolNotification,
    },
}

/// Cloneable handle to the broadcast bus.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<UiEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BUS_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UiEvent> {
        self.sender.subscribe()
    }

    /// Number of live subscribers. The approval gate uses this to fail
    /// closed when no UI collaborator is listening.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Publish an event; silently dropped when nobody is subscribed.
    pub fn publish(&self, event: UiEvent) {
        let _ = self.sender.send(event);
    }

    pub fn publish_chunk(&self, chat_id: &str, chunk: StreamChunk) {
        self.publish(UiEvent::Chunk {
            chat_id: chat_id.to_string(),
            chunk,
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
