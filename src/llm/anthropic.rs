use super::http::ResettableClient;
use super::sse::{SseBuffer, parse_data_lines};
use super::streaming::{EventStream, StreamEvent};
use super::traits::{Provider, SendOptions};
use super::types::{ChatMessage, ContentBlock, MessageRole, TurnReason};
use crate::error::ProviderError;
use crate::tools::ToolSpec;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const THINKING_BUDGET_TOKENS: u32 = 2048;

/// Native Anthropic Messages API adapter.
pub struct AnthropicProvider {
    cached_api_key: Option<String>,
    messages_url: String,
    client: ResettableClient,
}

// ── Request wire types ──────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireToolDef>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking: Option<ThinkingConfig>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ThinkingConfig {
    r#type: &'static str,
    budget_tokens: u32,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: Vec<WireContentBlock>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
}

#[derive(Debug, Serialize)]
struct WireToolDef {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

// ── Stream wire types ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireSseEvent {
    MessageStart {},
    ContentBlockStart {
        index: usize,
        content_block: StartedBlock,
    },
    ContentBlockDelta {
        index: usize,
        delta: BlockDelta,
    },
    ContentBlockStop {
        index: usize,
    },
    MessageDelta {
        delta: MessageDeltaBody,
    },
    MessageStop,
    Ping,
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StartedBlock {
    Text {},
    Thinking {},
    ToolUse { id: String, name: String },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BlockDelta {
    TextDelta { text: String },
    ThinkingDelta { thinking: String },
    InputJsonDelta { partial_json: String },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Deserialize)]
struct MessageDeltaBody {
    stop_reason: Option<String>,
}

// ── Implementation ──────────────────────────────────────────────────────────

impl AnthropicProvider {
    pub fn new(api_key: Option<&str>) -> Self {
        Self::with_base_url(api_key, None)
    }

    pub fn with_base_url(api_key: Option<&str>, base_url: Option<&str>) -> Self {
        let base = base_url
            .map_or("https://api.anthropic.com", |url| url.trim_end_matches('/'))
            .to_string();
        Self {
            cached_api_key: api_key
                .map(str::trim)
                .filter(|key| !key.is_empty())
                .map(ToString::to_string),
            messages_url: format!("{base}/v1/messages"),
            client: ResettableClient::new(),
        }
    }

    fn api_key(&self) -> anyhow::Result<&str> {
        self.cached_api_key.as_deref().ok_or_else(|| {
            anyhow::Error::new(ProviderError::MissingCredentials {
                provider: "anthropic".into(),
                hint: "set ANTHROPIC_API_KEY".into(),
            })
        })
    }

    fn to_wire_message(message: &ChatMessage) -> WireMessage {
        let role = match message.role {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        };
        let content = message
            .content
            .iter()
            .map(|block| match block {
                ContentBlock::Text { text } => WireContentBlock::Text { text: text.clone() },
                ContentBlock::ToolUse { id, name, input } => WireContentBlock::ToolUse {
                    id: id.clone(),
                    name: name.clone(),
                    input: input.clone(),
                },
                ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                    is_error,
                } => WireContentBlock::ToolResult {
                    tool_use_id: tool_use_id.clone(),
                    content: content.clone(),
                    is_error: if *is_error { Some(true) } else { None },
                },
            })
            .collect();
        WireMessage { role, content }
    }

    fn build_request(
        history: &[ChatMessage],
        tools: &[ToolSpec],
        options: SendOptions<'_>,
        model: String,
    ) -> MessagesRequest {
        MessagesRequest {
            model,
            max_tokens: options.max_tokens,
            system: options.system_prompt.map(ToString::to_string),
            messages: history.iter().map(Self::to_wire_message).collect(),
            tools: if tools.is_empty() {
                None
            } else {
                Some(
                    tools
                        .iter()
                        .map(|tool| WireToolDef {
                            name: tool.name.clone(),
                            description: tool.description.clone(),
                            input_schema: tool.parameters.clone(),
                        })
                        .collect(),
                )
            },
            thinking: options.thinking_enabled.then_some(ThinkingConfig {
                r#type: "enabled",
                budget_tokens: THINKING_BUDGET_TOKENS,
            }),
            stream: true,
        }
    }

    fn map_stop_reason(stop_reason: Option<&str>) -> TurnReason {
        match stop_reason {
            Some("tool_use") => TurnReason::ToolUse,
            _ => TurnReason::Stop,
        }
    }

    fn normalize_stream(response: reqwest::Response) -> EventStream {
        let mut byte_stream = response.bytes_stream();

        let stream = async_stream::try_stream! {
            let mut sse_buffer = SseBuffer::new();
            // index → tool-call id, for arg-delta and end events.
            let mut open_tool_blocks: HashMap<usize, String> = HashMap::new();
            let mut turn_ended = false;

            while let Some(chunk_result) = byte_stream.next().await {
                let chunk = chunk_result.map_err(|error| {
                    anyhow::Error::new(ProviderError::Streaming(format!(
                        "anthropic stream aborted: {error}"
                    )))
                })?;
                sse_buffer.push_chunk(&chunk);

                while let Some(block) = sse_buffer.next_event_block() {
                    for data in parse_data_lines(&block) {
                        let Ok(event) = serde_json::from_str::<WireSseEvent>(data) else {
                            continue;
                        };
                        match event {
                            WireSseEvent::ContentBlockStart { index, content_block } => {
                                if let StartedBlock::ToolUse { id, name } = content_block {
                                    open_tool_blocks.insert(index, id.clone());
                                    yield StreamEvent::ToolCallStart { id, name };
                                }
                            }
                            WireSseEvent::ContentBlockDelta { index, delta } => match delta {
                                BlockDelta::TextDelta { text } => {
                                    yield StreamEvent::TextDelta { text };
                                }
                                BlockDelta::ThinkingDelta { thinking } => {
                                    yield StreamEvent::ReasoningDelta { text: thinking };
                                }
                                BlockDelta::InputJsonDelta { partial_json } => {
                                    if let Some(id) = open_tool_blocks.get(&index) {
                                        yield StreamEvent::ToolCallArgDelta {
                                            id: id.clone(),
                                            json_fragment: partial_json,
                                        };
                                    }
                                }
                                BlockDelta::Unsupported => {}
                            },
                            WireSseEvent::ContentBlockStop { index } => {
                                if let Some(id) = open_tool_blocks.remove(&index) {
                                    yield StreamEvent::ToolCallEnd { id };
                                }
                            }
                            WireSseEvent::MessageDelta { delta } => {
                                if let Some(reason) = delta.stop_reason.as_deref() {
                                    turn_ended = true;
                                    yield StreamEvent::TurnEnd {
                                        reason: Self::map_stop_reason(Some(reason)),
                                    };
                                }
                            }
                            WireSseEvent::MessageStop => {
                                if !turn_ended {
                                    turn_ended = true;
                                    yield StreamEvent::TurnEnd { reason: TurnReason::Stop };
                                }
                            }
                            WireSseEvent::MessageStart {}
                            | WireSseEvent::Ping
                            | WireSseEvent::Unsupported => {}
                        }
                    }
                }
            }

            if !turn_ended {
                Err(anyhow::Error::new(ProviderError::Malformed {
                    provider: "anthropic".into(),
                    message: "stream ended without a message stop".into(),
                }))?;
            }
        };

        Box::pin(stream)
    }

    async fn post_stream(&self, request: &MessagesRequest) -> anyhow::Result<reqwest::Response> {
        let api_key = self.api_key()?;
        let response = self
            .client
            .get()
            .post(&self.messages_url)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .header("x-api-key", api_key)
            .json(request)
            .send()
            .await
            .map_err(|error| {
                anyhow::Error::new(ProviderError::Transport {
                    provider: "anthropic".into(),
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
                    provider: "anthropic".into(),
                    hint: format!("API rejected credentials ({status})"),
                }
            } else {
                ProviderError::Transport {
                    provider: "anthropic".into(),
                    message: format!("{status}: {body}"),
                }
            };
            return Err(anyhow::Error::new(error));
        }

        Ok(response)
    }
}

impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn resolve_model(&self, alias: &str) -> String {
        match alias {
            "opus" => "claude-opus-4-1".to_string(),
            "sonnet" => "claude-sonnet-4-5".to_string(),
            "haiku" => "claude-haiku-4-5".to_string(),
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
            Ok(Self::normalize_stream(response))
        })
    }

    fn reset_client(&self) {
        self.client.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_without_key() {
        let provider = AnthropicProvider::new(None);
        assert!(provider.cached_api_key.is_none());
        assert_eq!(
            provider.messages_url,
            "https://api.anthropic.com/v1/messages"
        );
    }

    #[test]
    fn whitespace_key_is_ignored() {
        let provider = AnthropicProvider::new(Some("   "));
        assert!(provider.cached_api_key.is_none());
    }

    #[test]
    fn custom_base_url_trims_trailing_slash() {
        let provider = AnthropicProvider::with_base_url(None, Some("https://proxy.example.com/"));
        assert_eq!(
            provider.messages_url,
            "https://proxy.example.com/v1/messages"
        );
    }

    #[tokio::test]
    async fn send_fails_without_key() {
        let provider = AnthropicProvider::new(None);
        let history = vec![ChatMessage::user("hello")];
        let result = provider
            .send(&history, &[], SendOptions::new("sonnet"))
            .await;
        let error = result.err().expect("should fail");
        let provider_error = error
            .downcast_ref::<ProviderError>()
            .expect("provider error");
        assert!(matches!(
            provider_error,
            ProviderError::MissingCredentials { .. }
        ));
    }

    #[test]
    fn resolve_model_maps_aliases_and_falls_back() {
        let provider = AnthropicProvider::new(None);
        assert_eq!(provider.resolve_model("sonnet"), "claude-sonnet-4-5");
        assert_eq!(
            provider.resolve_model("claude-3-opus-latest"),
            "claude-3-opus-latest"
        );
    }

    #[test]
    fn request_serializes_tool_result_shape() {
        let history = vec![
            ChatMessage::assistant(vec![ContentBlock::ToolUse {
                id: "toolu_1".into(),
                name: "file_read".into(),
                input: serde_json::json!({"path": "foo.txt"}),
            }]),
            ChatMessage::tool_results(vec![ContentBlock::ToolResult {
                tool_use_id: "toolu_1".into(),
                content: "contents".into(),
                is_error: false,
            }]),
        ];
        let request =
            AnthropicProvider::build_request(&history, &[], SendOptions::new("m"), "m".into());
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["messages"][0]["role"], "assistant");
        assert_eq!(json["messages"][0]["content"][0]["type"], "tool_use");
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["messages"][1]["content"][0]["type"], "tool_result");
        assert_eq!(
            json["messages"][1]["content"][0]["tool_use_id"],
            "toolu_1"
        );
        // is_error omitted when false.
        assert!(json["messages"][1]["content"][0].get("is_error").is_none());
    }

    #[test]
    fn request_includes_thinking_only_when_enabled() {
        let history = vec![ChatMessage::user("hi")];
        let mut options = SendOptions::new("m");
        options.thinking_enabled = true;
        let request = AnthropicProvider::build_request(&history, &[], options, "m".into());
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["thinking"]["type"], "enabled");

        let request =
            AnthropicProvider::build_request(&history, &[], SendOptions::new("m"), "m".into());
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("thinking").is_none());
    }

    #[test]
    fn request_serializes_tool_declarations() {
        let tools = vec![ToolSpec {
            name: "file_read".into(),
            description: "Read a file".into(),
            parameters: serde_json::json!({"type": "object"}),
        }];
        let history = vec![ChatMessage::user("hi")];
        let request =
            AnthropicProvider::build_request(&history, &tools, SendOptions::new("m"), "m".into());
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["tools"][0]["name"], "file_read");
        assert_eq!(json["tools"][0]["input_schema"]["type"], "object");
        assert_eq!(json["stream"], true);
    }

    #[test]
    fn sse_event_deserializes_tool_use_start() {
        let data = r#"{"type":"content_block_start","index":1,"content_block":{"type":"tool_use","id":"toolu_9","name":"task_create"}}"#;
        let event: WireSseEvent = serde_json::from_str(data).unwrap();
        match event {
            WireSseEvent::ContentBlockStart {
                index,
                content_block: StartedBlock::ToolUse { id, name },
            } => {
                assert_eq!(index, 1);
                assert_eq!(id, "toolu_9");
                assert_eq!(name, "task_create");
            }
            _ => panic!("expected tool_use start"),
        }
    }

    #[test]
    fn sse_event_tolerates_unknown_types() {
        let event: WireSseEvent =
            serde_json::from_str(r#"{"type":"some_future_event"}"#).unwrap();
        assert!(matches!(event, WireSseEvent::Unsupported));
    }

    #[test]
    fn map_stop_reason_tool_use_vs_stop() {
        assert_eq!(
            AnthropicProvider::map_stop_reason(Some("tool_use")),
            TurnReason::ToolUse
        );
        assert_eq!(
            AnthropicProvider::map_stop_reason(Some("end_turn")),
            TurnReason::Stop
        );
        assert_eq!(
            AnthropicProvider::map_stop_reason(Some("max_tokens")),
            TurnReason::Stop
        );
    }
}
