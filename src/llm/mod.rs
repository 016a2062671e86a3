// ── Infrastructure ───────────────────────────────────────────────────────────
pub mod http;
pub mod sse;
pub mod streaming;
pub mod traits;
pub mod types;

// ── Provider implementations ────────────────────────────────────────────────
pub mod anthropic;
pub mod factory;
pub mod gemini;
pub mod openai;

// ── Infrastructure re-exports ───────────────────────────────────────────────
pub use http::{ResettableClient, build_provider_client};
pub use sse::{SseBuffer, parse_data_lines};
pub use streaming::{EventStream, StreamCollector, StreamEvent, TurnOutcome};
pub use traits::{Provider, SendOptions};
pub use types::{ChatMessage, ContentBlock, MessageRole, ToolCallRequest, TurnReason};

// ── Provider + factory re-exports ───────────────────────────────────────────
pub use anthropic::AnthropicProvider;
pub use factory::create_provider;
pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;
