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

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini `streamGenerateContent` adapter.
///
/// Gemini has no tool-call ids on the wire: function calls are addressed by
/// name, and calls arrive as complete parts rather than argument fragments.
/// The adapter mints a synthetic id per call and replays the full argument
/// payload as a single fragment so the neutral event contract holds.
pub struct GeminiProvider {
    cached_api_key: Option<String>,
    base_url: String,
    client: ResettableClient,
}

// ── Request wire types ──────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<WireContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<WireContentBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireToolBlock>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct WireContent {
    role: &'static str,
    parts: Vec<WirePart>,
}

#[derive(Debug, Serialize)]
struct WireContentBody {
    parts: Vec<WirePart>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
enum WirePart {
    #[serde(rename = "text")]
    Text(String),
    FunctionCall(WireFunctionCall),
    FunctionResponse(WireFunctionResponse),
}

#[derive(Debug, Serialize)]
struct WireFunctionCall {
    name: String,
    args: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct WireFunctionResponse {
    name: String,
    response: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireToolBlock {
    function_declarations: Vec<WireFunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct WireFunctionDeclaration {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
}

// ── Stream wire types ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    candidates: Vec<ChunkCandidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChunkCandidate {
    #[serde(default)]
    content: Option<ChunkContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkContent {
    #[serde(default)]
    parts: Vec<ChunkPart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChunkPart {
    text: Option<String>,
    #[serde(default)]
    thought: bool,
    function_call: Option<ChunkFunctionCall>,
}

#[derive(Debug, Deserialize)]
struct ChunkFunctionCall {
    name: String,
    #[serde(default)]
    args: serde_json::Value,
}

// ── Implementation ──────────────────────────────────────────────────────────

impl GeminiProvider {
    pub fn new(api_key: Option<&str>) -> Self {
        Self::with_base_url(api_key, None)
    }

    pub fn with_base_url(api_key: Option<&str>, base_url: Option<&str>) -> Self {
        Self {
            cached_api_key: api_key
                .map(str::trim)
                .filter(|key| !key.is_empty())
                .map(String::from),
            base_url: base_url
                .map_or(GEMINI_BASE_URL, |url| url.trim_end_matches('/'))
                .to_string(),
            client: ResettableClient::new(),
        }
    }

    /// Map history onto Gemini contents. Tool results are re-addressed from
    /// call id back to function name using the preceding assistant turns.
    fn map_history(history: &[ChatMessage]) -> Vec<WireContent> {
        let mut call_names: HashMap<String, String> = HashMap::new();
        let mut contents = Vec::new();

        for message in history {
            let role = match message.role {
                MessageRole::User => "user",
                MessageRole::Assistant => "model",
            };
            let mut parts = Vec::new();

            for block in &message.content {
                match block {
                    ContentBlock::Text { text } => parts.push(WirePart::Text(text.clone())),
                    ContentBlock::ToolUse { id, name, input } => {
                        call_names.insert(id.clone(), name.clone());
                        parts.push(WirePart::FunctionCall(WireFunctionCall {
                            name: name.clone(),
                            args: input.clone(),
                        }));
                    }
                    ContentBlock::ToolResult {
                        tool_use_id,
                        content,
                        is_error,
                    } => {
                        let name = call_names
                            .get(tool_use_id)
                            .cloned()
                            .unwrap_or_else(|| tool_use_id.clone());
                        let key = if *is_error { "error" } else { "output" };
                        parts.push(WirePart::FunctionResponse(WireFunctionResponse {
                            name,
                            response: serde_json::json!({ key: content }),
                        }));
                    }
                }
            }

            if !parts.is_empty() {
                contents.push(WireContent { role, parts });
            }
        }

        contents
    }

    fn build_request(
        history: &[ChatMessage],
        tools: &[ToolSpec],
        options: SendOptions<'_>,
    ) -> GenerateRequest {
        GenerateRequest {
            contents: Self::map_history(history),
            system_instruction: options.system_prompt.map(|system| WireContentBody {
                parts: vec![WirePart::Text(system.to_string())],
            }),
            tools: (!tools.is_empty()).then(|| {
                vec![WireToolBlock {
                    function_declarations: tools
                        .iter()
                        .map(|tool| WireFunctionDeclaration {
                            name: tool.name.clone(),
                            description: tool.description.clone(),
                            parameters: tool.parameters.clone(),
                        })
                        .collect(),
                }]
            }),
            generation_config: GenerationConfig {
                max_output_tokens: options.max_tokens,
            },
        }
    }

    fn normalize_stream(response: reqwest::Response) -> EventStream {
        let mut byte_stream = response.bytes_stream();

        let stream = async_stream::try_stream! {
            let mut sse_buffer = SseBuffer::new();
            let mut saw_tool_call = false;
            let mut turn_ended = false;

            while let Some(chunk_result) = byte_stream.next().await {
                let chunk = chunk_result.map_err(|error| {
                    anyhow::Error::new(ProviderError::Streaming(format!(
                        "gemini stream aborted: {error}"
                    )))
                })?;
                sse_buffer.push_chunk(&chunk);

                while let Some(block) = sse_buffer.next_event_block() {
                    for data in parse_data_lines(&block) {
                        let Ok(parsed) = serde_json::from_str::<GenerateChunk>(data) else {
                            continue;
                        };

                        for candidate in &parsed.candidates {
                            for part in candidate
                                .content
                                .as_ref()
                                .map(|content| content.parts.as_slice())
                                .unwrap_or_default()
                            {
                                if let Some(text) = &part.text
                                    && !text.is_empty()
                                {
                                    if part.thought {
                                        yield StreamEvent::ReasoningDelta { text: text.clone() };
                                    } else {
                                        yield StreamEvent::TextDelta { text: text.clone() };
                                    }
                                }

                                if let Some(call) = &part.function_call {
                                    saw_tool_call = true;
                                    let id = format!("call_{}", uuid::Uuid::new_v4());
                                    yield StreamEvent::ToolCallStart {
                                        id: id.clone(),
                                        name: call.name.clone(),
                                    };
                                    yield StreamEvent::ToolCallArgDelta {
                                        id: id.clone(),
                                        json_fragment: call.args.to_string(),
                                    };
                                    yield StreamEvent::ToolCallEnd { id };
                                }
                            }

                            if candidate.finish_reason.is_some() && !turn_ended {
                                turn_ended = true;
                                let reason = if saw_tool_call {
                                    TurnReason::ToolUse
                                } else {
                                    TurnReason::Stop
                                };
                                yield StreamEvent::TurnEnd { reason };
                            }
                        }
                    }
                }
            }

            if !turn_ended {
                Err(anyhow::Error::new(ProviderError::Malformed {
                    provider: "gemini".into(),
                    message: "stream ended without a finish reason".into(),
                }))?;
            }
        };

        Box::pin(stream)
    }

    async fn post_stream(
        &self,
        model: &str,
        request: &GenerateRequest,
    ) -> anyhow::Result<reqwest::Response> {
        let api_key = self.cached_api_key.as_ref().ok_or_else(|| {
            anyhow::Error::new(ProviderError::MissingCredentials {
                provider: "gemini".into(),
                hint: "set GEMINI_API_KEY or GOOGLE_API_KEY".into(),
            })
        })?;

        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url, model
        );
        let response = self
            .client
            .get()
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(request)
            .send()
            .await
            .map_err(|error| {
                anyhow::Error::new(ProviderError::Transport {
                    provider: "gemini".into(),
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
                    provider: "gemini".into(),
                    hint: format!("API rejected credentials ({status})"),
                }
            } else {
                ProviderError::Transport {
                    provider: "gemini".into(),
                    message: format!("{status}: {body}"),
                }
            };
            return Err(anyhow::Error::new(error));
        }

        Ok(response)
    }
}

impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn resolve_model(&self, alias: &str) -> String {
        match alias {
            "gemini" | "pro" => "gemini-2.5-pro".to_string(),
            "flash" => "gemini-2.5-flash".to_string(),
            other => other.trim_start_matches("models/").to_string(),
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
            let request = Self::build_request(history, tools, options);
            let response = self.post_stream(&model, &request).await?;
            Ok(Self::normalize_stream(response))
        })
    }

    fn reset_client(&self) {
        self.client.reset();
    }
}
