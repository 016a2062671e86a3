use super::types::{ToolCallRequest, TurnReason};
use anyhow::Result;
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send + 'static>>;

/// Vendor-neutral streaming events. Every adapter normalizes its wire
/// protocol into this sequence; the agent loop never sees vendor shapes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum StreamEvent {
    TextDelta {
        text: String,
    },
    /// Extended-reasoning output; only emitted when the vendor supports it
    /// and thinking is enabled.
    ReasoningDelta {
        text: String,
    },
    ToolCallStart {
        id: String,
        name: String,
    },
    ToolCallArgDelta {
        id: String,
        json_fragment: String,
    },
    /// The adapter has delivered every argument fragment for this call.
    ToolCallEnd {
        id: String,
    },
    TurnEnd {
        reason: TurnReason,
    },
}

struct ToolCallBuilder {
    id: String,
    name: String,
    input_json: String,
    complete: bool,
}

/// Accumulated output of one provider turn.
#[derive(Debug, Clone, Default)]
pub struct TurnOutcome {
    pub text: String,
    pub reasoning: String,
    pub tool_calls: Vec<ToolCallRequest>,
    pub reason: Option<TurnReason>,
}

/// Accumulates a single turn's stream into a [`TurnOutcome`].
///
/// Argument fragments are concatenated per call id and parsed exactly once
/// when `ToolCallEnd` arrives. A call whose payload fails to parse is dropped
/// with a logged warning; the turn itself is unaffected.
pub struct StreamCollector {
    text: String,
    reasoning: String,
    builders: Vec<ToolCallBuilder>,
    completed: Vec<ToolCallRequest>,
    reason: Option<TurnReason>,
}

impl StreamCollector {
    pub fn new() -> Self {
        Self {
            text: String::new(),
            reasoning: String::new(),
            builders: Vec::new(),
            completed: Vec::new(),
            reason: None,
        }
    }

    pub fn feed(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::TextDelta { text } => self.text.push_str(text),
            StreamEvent::ReasoningDelta { text } => self.reasoning.push_str(text),
            StreamEvent::ToolCallStart { id, name } => {
                self.builders.push(ToolCallBuilder {
                    id: id.clone(),
                    name: name.clone(),
                    input_json: String::new(),
                    complete: false,
                });
            }
            StreamEvent::ToolCallArgDelta { id, json_fragment } => {
                if let Some(builder) = self.builder_mut(id) {
                    builder.input_json.push_str(json_fragment);
                } else {
                    tracing::warn!(call_id = %id, "argument fragment for unknown tool call");
                }
            }
            StreamEvent::ToolCallEnd { id } => self.finalize_call(id),
            StreamEvent::TurnEnd { reason } => self.reason = Some(*reason),
        }
    }

    fn builder_mut(&mut self, id: &str) -> Option<&mut ToolCallBuilder> {
        self.builders
            .iter_mut()
            .find(|builder| builder.id == id && !builder.complete)
    }

    fn finalize_call(&mut self, id: &str) {
        let Some(builder) = self.builder_mut(id) else {
            tracing::warn!(call_id = %id, "tool call end without matching start");
            return;
        };
        builder.complete = true;
        let call_id = builder.id.clone();
        let name = builder.name.clone();

        // Some vendors omit the payload entirely for zero-argument calls.
        let payload = if builder.input_json.trim().is_empty() {
            "{}".to_string()
        } else {
            std::mem::take(&mut builder.input_json)
        };

        match serde_json::from_str::<serde_json::Value>(&payload) {
            Ok(input) => self.completed.push(ToolCallRequest {
                id: call_id,
                name,
                input,
            }),
            Err(error) => {
                tracing::warn!(
                    call_id = %call_id,
                    tool_name = %name,
                    "dropping tool call with malformed argument JSON: {error}"
                );
            }
        }
    }

    pub fn finish(mut self) -> TurnOutcome {
        for builder in &self.builders {
            if !builder.complete {
                tracing::warn!(
                    call_id = %builder.id,
                    tool_name = %builder.name,
                    "dropping tool call that never completed"
                );
            }
        }
        TurnOutcome {
            text: std::mem::take(&mut self.text),
            reasoning: std::mem::take(&mut self.reasoning),
            tool_calls: std::mem::take(&mut self.completed),
            reason: self.reason,
        }
    }
}

impl Default for StreamCollector {
    fn default() -> Self {
        Self::new()
    }
}
