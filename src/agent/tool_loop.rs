use crate::events::{EventBus, StreamChunk};
use crate::llm::streaming::{StreamCollector, StreamEvent};
use crate::llm::traits::{Provider, SendOptions};
use crate::llm::types::{ChatMessage, ContentBlock, ToolCallRequest, TurnReason};
use crate::tools::{ExecutionContext, ToolExecutor, ToolResult, ToolSpec};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ── Constants ────────────────────────────────────────────────────────────────

/// Absolute upper bound on tool-loop turns, regardless of caller request.
pub(crate) const TOOL_LOOP_HARD_CAP: u32 = 25;

// ── Public types ─────────────────────────────────────────────────────────────

/// Orchestrates a multi-turn tool-use conversation with an LLM provider.
///
/// One loop invocation owns its conversation history: the history is the
/// single source of truth passed to every provider turn and only ever grows
/// by appending. Tool calls within a turn run sequentially in declared order
/// so results land in the order the vendor protocols require.
pub struct AgentLoop {
    provider: Arc<dyn Provider>,
    executor: Arc<ToolExecutor>,
    bus: EventBus,
    max_turns: u32,
}

/// Parameters for a single [`AgentLoop::run`] invocation.
pub struct AgentRunParams<'a> {
    pub system_prompt: Option<&'a str>,
    pub user_message: &'a str,
    pub model: &'a str,
    pub thinking_enabled: bool,
    pub ctx: &'a ExecutionContext,
    pub conversation_history: &'a [ChatMessage],
}

/// Record of a single tool invocation within the loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub tool_name: String,
    pub input: serde_json::Value,
    pub result: ToolResult,
    pub turn: u32,
}

/// Why the loop terminated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopStopReason {
    /// The model finished without requesting more tool calls.
    Completed,
    /// The configured turn limit was reached.
    MaxTurns,
    /// A provider failure ended the loop; partial output is retained.
    Error(String),
}

/// Final output of a [`AgentLoop::run`] invocation.
pub struct AgentRunResult {
    /// All streamed text across every turn, concatenated.
    pub final_text: String,
    /// All streamed reasoning across every turn, concatenated.
    pub reasoning: String,
    pub tool_calls: Vec<ToolCallRecord>,
    /// Full history including every appended assistant/tool-result message.
    pub history: Vec<ChatMessage>,
    pub turns: u32,
    pub stop_reason: LoopStopReason,
}

// ── Implementation ───────────────────────────────────────────────────────────

impl AgentLoop {
    pub fn new(
        provider: Arc<dyn Provider>,
        executor: Arc<ToolExecutor>,
        bus: EventBus,
        max_turns: u32,
    ) -> Self {
        Self {
            provider,
            executor,
            bus,
            max_turns: max_turns.clamp(1, TOOL_LOOP_HARD_CAP),
        }
    }

    /// Run the tool-use loop to completion.
    ///
    /// Sends the conversation to the provider, executes any tool calls the
    /// model requests, appends the results, and repeats until the model
    /// stops requesting tools or the turn limit is reached.
    pub async fn run(&self, params: AgentRunParams<'_>) -> anyhow::Result<AgentRunResult> {
        let tools = self
            .executor
            .registry()
            .specs_for_context(params.ctx);

        let mut messages: Vec<ChatMessage> = params.conversation_history.to_vec();
        messages.push(ChatMessage::user(params.user_message));

        let mut final_text = String::new();
        let mut reasoning = String::new();
        let mut tool_calls: Vec<ToolCallRecord> = Vec::new();
        let mut turns: u32 = 0;

        loop {
            if turns >= self.max_turns {
                tracing::warn!(turns, "tool loop reached its turn limit");
                return Ok(self.finish(
                    final_text,
                    reasoning,
                    tool_calls,
                    messages,
                    turns,
                    LoopStopReason::MaxTurns,
                    params.ctx,
                ));
            }

            let outcome = match self
                .stream_one_turn(&messages, &tools, &params)
                .await
            {
                Ok(outcome) => outcome,
                Err(error) => {
                    let message = format!("{error:#}");
                    self.bus.publish_chunk(
                        &params.ctx.chat_id,
                        StreamChunk::Error {
                            message: message.clone(),
                        },
                    );
                    return Ok(self.finish(
                        final_text,
                        reasoning,
                        tool_calls,
                        messages,
                        turns,
                        LoopStopReason::Error(message),
                        params.ctx,
                    ));
                }
            };

            turns += 1;
            final_text.push_str(&outcome.text);
            reasoning.push_str(&outcome.reasoning);

            let mut assistant_blocks = Vec::new();
            if !outcome.text.is_empty() {
                assistant_blocks.push(ContentBlock::Text {
                    text: outcome.text.clone(),
                });
            }
            for call in &outcome.tool_calls {
                assistant_blocks.push(ContentBlock::ToolUse {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    input: call.input.clone(),
                });
            }
            if !assistant_blocks.is_empty() {
                messages.push(ChatMessage::assistant(assistant_blocks));
            }

            let requested_tools = outcome.reason == Some(TurnReason::ToolUse);
            if requested_tools && !outcome.tool_calls.is_empty() {
                let results = self
                    .dispatch_tools(&outcome.tool_calls, &mut tool_calls, turns, params.ctx)
                    .await;
                messages.push(ChatMessage::tool_results(results));
                continue;
            }

            if requested_tools {
                // Every requested call was dropped as malformed; there is
                // nothing to answer, so looping again could never progress.
                tracing::warn!("turn requested tools but none were parseable; stopping");
            }

            return Ok(self.finish(
                final_text,
                reasoning,
                tool_calls,
                messages,
                turns,
                LoopStopReason::Completed,
                params.ctx,
            ));
        }
    }

    /// One provider round-trip: consume the stream, mirror chunks to the
    /// bus, and collect the turn outcome.
    async fn stream_one_turn(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
        params: &AgentRunParams<'_>,
    ) -> anyhow::Result<crate::llm::streaming::TurnOutcome> {
        let mut options = SendOptions::new(params.model);
        options.system_prompt = params.system_prompt;
        options.thinking_enabled = params.thinking_enabled;

        let mut stream = if tools.is_empty() {
            self.provider.send_simple(messages, options).await?
        } else {
            self.provider.send(messages, tools, options).await?
        };

        let mut collector = StreamCollector::new();
        while let Some(event_result) = stream.next().await {
            let event = event_result?;
            self.mirror_event(&params.ctx.chat_id, &event);
            collector.feed(&event);
        }
        Ok(collector.finish())
    }

    fn mirror_event(&self, chat_id: &str, event: &StreamEvent) {
        let chunk = match event {
            StreamEvent::TextDelta { text } => StreamChunk::Text { text: text.clone() },
            StreamEvent::ReasoningDelta { text } => StreamChunk::Thinking { text: text.clone() },
            StreamEvent::ToolCallStart { name, .. } => {
                StreamChunk::ToolUseStart { name: name.clone() }
            }
            StreamEvent::ToolCallArgDelta { .. }
            | StreamEvent::ToolCallEnd { .. }
            | StreamEvent::TurnEnd { .. } => return,
        };
        self.bus.publish_chunk(chat_id, chunk);
    }

    /// Execute one turn's tool calls sequentially, in declared order, and
    /// return the result blocks in the same order.
    async fn dispatch_tools(
        &self,
        calls: &[ToolCallRequest],
        records: &mut Vec<ToolCallRecord>,
        turn: u32,
        ctx: &ExecutionContext,
    ) -> Vec<ContentBlock> {
        let mut blocks = Vec::with_capacity(calls.len());
        for call in calls {
            let result = self
                .executor
                .execute(&call.name, call.input.clone(), ctx)
                .await;

            self.bus.publish_chunk(
                &ctx.chat_id,
                StreamChunk::ToolResult {
                    name: call.name.clone(),
                    is_error: result.is_error,
                },
            );

            blocks.push(ContentBlock::ToolResult {
                tool_use_id: call.id.clone(),
                content: result.content.clone(),
                is_error: result.is_error,
            });
            records.push(ToolCallRecord {
                tool_name: call.name.clone(),
                input: call.input.clone(),
                result,
                turn,
            });
        }
        blocks
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        final_text: String,
        reasoning: String,
        tool_calls: Vec<ToolCallRecord>,
        history: Vec<ChatMessage>,
        turns: u32,
        stop_reason: LoopStopReason,
        ctx: &ExecutionContext,
    ) -> AgentRunResult {
        if stop_reason != LoopStopReason::Completed {
            tracing::info!(?stop_reason, turns, "agent loop ended early");
        }
        if !matches!(stop_reason, LoopStopReason::Error(_)) {
            self.bus
                .publish_chunk(&ctx.chat_id, StreamChunk::Complete);
        }
        AgentRunResult {
            final_text,
            reasoning,
            tool_calls,
            history,
            turns,
            stop_reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_turns_is_clamped_to_hard_cap() {
        // Constructed indirectly; the clamp itself is what matters.
        assert_eq!(100u32.clamp(1, TOOL_LOOP_HARD_CAP), TOOL_LOOP_HARD_CAP);
        assert_eq!(0u32.clamp(1, TOOL_LOOP_HARD_CAP), 1);
    }
}
