use super::http::ResettableClient;
use super::sse::{SseBuffer, parse_data_lines};
use super::streaming::{EventStream, StreamEvent};
use super::traits::{Provider, SendOptions};
use super::types::{ChatMessage, ContentBlock, MessageRole, TurnReason};
use crate::error::ProviderError;
use crate::tools::ToolSpec;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

/// OpenAI chat-completions adapter, also used for any compatible endpoint
/// via [`OpenAiProvider::with_base_url`].
pub struct OpenAiProvider {
    display_name: String,
    cached_auth_header: Option<String>,
    chat_url: String,
    client: ResettableClient,
}

// ── Request wire types ──────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Serialize)]
struct WireToolCall {
    id: String,
    r#type: &'static str,
    function: WireToolCallFunction,
}

#[derive(Debug, Serialize)]
struct WireToolCallFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct WireTool {
    r#type: &'static str,
    function: WireToolDefinition,
}

#[derive(Debug, Serialize)]
struct WireToolDefinition {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

// ── Stream wire types ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ChatChunk {
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    delta: ChunkDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ChunkDelta {
    content: Option<String>,
    /// Extended-reasoning stream used by several compatible vendors.
    reasoning_content: Option<String>,
    tool_calls: Option<Vec<ChunkToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ChunkToolCall {
    index: u32,
    id: Option<String>,
    function: Option<ChunkToolCallFunction>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ChunkToolCallFunction {
    name: Option<String>,
    arguments: Option<String>,
}

// ── Implementation ──────────────────────────────────────────────────────────

impl OpenAiProvider {
    pub fn new(api_key: Option<&str>) -> Self {
        Self::with_base_url("openai", "https://api.openai.com", api_key)
    }

    pub fn with_base_url(display_name: &str, base_url: &str, api_key: Option<&str>) -> Self {
        Self {
            display_name: display_name.to_string(),
            cached_auth_header: api_key
                .map(str::trim)
                .filter(|key| !key.is_empty())
                .map(|key| format!("Bearer {key}")),
            chat_url: format!("{}/v1/chat/completions", base_url.trim_end_matches('/')),
            client: ResettableClient::new(),
        }
    }

    /// Flatten one neutral message into the chat-completions shape: tool
    /// results become dedicated `tool`-role messages, preserving order.
    fn map_message(message: &ChatMessage) -> Vec<WireMessage> {
        let mut text_parts = Vec::new();
        let mut tool_calls = Vec::new();
        let mut tool_messages = Vec::new();

        for block in &message.content {
            match block {
                ContentBlock::Text { text } => text_parts.push(text.clone()),
                ContentBlock::ToolUse { id, name, input } => {
                    tool_calls.push(WireToolCall {
                        id: id.clone(),
                        r#type: "function",
                        function: WireToolCallFunction {
                            name: name.clone(),
                            arguments: input.to_string(),
                        },
                    });
                }
                ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                    is_error: _,
                } => {
                    tool_messages.push(WireMessage {
                        role: "tool",
                        content: Some(content.clone()),
                        tool_call_id: Some(tool_use_id.clone()),
                        tool_calls: None,
                    });
                }
            }
        }

        let text_content = if text_parts.is_empty() {
            None
        } else {
            Some(text_parts.join("\n"))
        };

        let mut messages = Vec::new();
        match message.role {
            MessageRole::Assistant => {
                if text_content.is_some() || !tool_calls.is_empty() {
                    messages.push(WireMessage {
                        role: "assistant",
                        content: text_content,
                        tool_call_id: None,
                        tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
                    });
                }
            }
            MessageRole::User => {
                if let Some(content) = text_content {
                    messages.push(WireMessage {
                        role: "user",
                        content: Some(content),
                        tool_call_id: None,
                        tool_calls: None,
                    });
                }
            }
        }

        messages.extend(tool_messages);
        messages
    }

    fn build_request(
        history: &[ChatMessage],
        tools: &[ToolSpec],
        options: SendOptions<'_>,
        model: String,
    ) -> ChatRequest {
        let mut messages = Vec::new();
        if let Some(system) = options.system_prompt {
            messages.push(WireMessage {
                role: "system",
                content: Some(system.to_string()),
                tool_call_id: None,
                tool_calls: None,
            });
        }
        for message in history {
            messages.extend(Self::map_message(message));
        }

        ChatRequest {
            model,
            messages,
            tools: (!tools.is_empty()).then(|| {
                tools
                    .iter()
                    .map(|tool| WireTool {
                        r#type: "function",
                        function: WireToolDefinition {
                            name: tool.name.clone(),
                            description: tool.description.clone(),
                            parameters: tool.parameters.clone(),
                        },
                    })
                    .collect()
            }),
            max_tokens: options.max_tokens,
            stream: true,
        }
    }

    fn map_finish_reason(finish_reason: &str) -> TurnReason {
        match finish_reason {
            "tool_calls" => TurnReason::ToolUse,
            _ => TurnReason::Stop,
        }
    }

    fn normalize_stream(response: reqwest::Response, provider_name: String) -> EventStream {
        let mut byte_stream = response.bytes_stream();

        let stream = async_stream::try_stream! {
            let mut sse_buffer = SseBuffer::new();
            // Argument fragments arrive keyed by index; calls are announced
            // to the loop keyed by id, so track the mapping. BTreeMap keeps
            // index order for the trailing ToolCallEnd batch.
            let mut open_calls: BTreeMap<u32, String> = BTreeMap::new();
            let mut turn_ended = false;

            while let Some(chunk_result) = byte_stream.next().await {
                let chunk = chunk_result.map_err(|error| {
                    anyhow::Error::new(ProviderError::Streaming(format!(
                        "{provider_name} stream aborted: {error}"
                    )))
                })?;
                sse_buffer.push_chunk(&chunk);

                while let Some(block) = sse_buffer.next_event_block() {
                    for data in parse_data_lines(&block) {
                        let Ok(parsed) = serde_json::from_str::<ChatChunk>(data) else {
                            continue;
                        };

                        for choice in &parsed.choices {
                            if let Some(text) = &choice.delta.content
                                && !text.is_empty()
                            {
                                yield StreamEvent::TextDelta { text: text.clone() };
                            }

                            if let Some(text) = &choice.delta.reasoning_content
                                && !text.is_empty()
                            {
                                yield StreamEvent::ReasoningDelta { text: text.clone() };
                            }

                            for call in choice.delta.tool_calls.as_deref().unwrap_or_default() {
                                if !open_calls.contains_key(&call.index) {
                                    let id = call
                                        .id
                                        .clone()
                                        .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4()));
                                    let name = call
                                        .function
                                        .as_ref()
                                        .and_then(|function| function.name.clone())
                                        .unwrap_or_default();
                                    open_calls.insert(call.index, id.clone());
                                    yield StreamEvent::ToolCallStart { id, name };
                                }
                                if let Some(arguments) = call
                                    .function
                                    .as_ref()
                                    .and_then(|function| function.arguments.clone())
                                    && !arguments.is_empty()
                                {
                                    let id = open_calls[&call.index].clone();
                                    yield StreamEvent::ToolCallArgDelta {
                                        id,
                                        json_fragment: arguments,
                                    };
                                }
                            }

                            if let Some(finish) = choice.finish_reason.as_deref() {
                                for id in std::mem::take(&mut open_calls).into_values() {
                                    yield StreamEvent::ToolCallEnd { id };
                                }
                                turn_ended = true;
                                yield StreamEvent::TurnEnd {
                                    reason: Self::map_finish_reason(finish),
                                };
                            }
                        }
                    }
                }
            }

            if !turn_ended {
                Err(anyhow::Error::new(ProviderError::Malformed {
                    provider: provider_name.clone(),
                    message: "stream ended without a finish reason".into(),
                }))?;
            }
        };

        Box::pin(stream)
    }

    async fn post_stream(&self, request: &ChatRequest) -> anyhow::Result<reqwest::Response> {
        let auth_header = self.cached_auth_header.as_ref().ok_or_else(|| {
            anyhow::Error::new(ProviderError::MissingCredentials {
                provider: self.display_name.clone(),
                hint: "set OPENAI_API_KEY".into(),
            })
        })?;

        let response = self
            .client
            .get()
            .post(&self.chat_url)
            .header("Authorization", auth_header)
            .json(request)
            .send()
            .await
            .map_err(|error| {
                anyhow::Error::new(ProviderError::Transport {
                    provider: self.display_name.clone(),
                    message: error.to_string(),
                })
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error = if status == reqwest::StatusCode::UNAUTHORIZED
                || status == reqwest::StatusCode::FORBIDDEN
            {
                ProviderError::MissingCredentials {
                    provider: self.display_name.clone(),
                    hint: format!("API rejected credentials ({status})"),
                }
            } else {
                ProviderError::Transport {
                    provider: self.display_name.clone(),
                    message: format!("{status}: {body}"),
                }
            };
            return Err(anyhow::Error::new(error));
        }

        Ok(response)
    }
}

impl Provider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.display_name
    }

    fn resolve_model(&self, alias: &str) -> String {
        match alias {
            "gpt" => "gpt-4o".to_string(),
            "gpt-mini" => "gpt-4o-mini".to_string(),
            other => other.to_string(),
        }
    }

    fn send<'a>(
        &'a self,
        history: &'a [ChatMessage],
        tools: &'a [ToolSpec],
        options: SendOptions<'a>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<EventStream>> + Send + 'a>> {
        Box::pin(async move {
            let model = self.resolve_model(options.model);
            let request = Self::build_request(history, tools, options, model);
            let response = self.post_stream(&request).await?;
            Ok(Self::normalize_stream(response, self.display_name.clone()))
        })
    }

    fn reset_client(&self) {
        self.client.reset();
    }
}
