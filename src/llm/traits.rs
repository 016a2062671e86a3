use super::streaming::EventStream;
use super::types::ChatMessage;
use crate::tools::ToolSpec;
use std::future::Future;
use std::pin::Pin;

/// Options for a single provider turn.
#[derive(Debug, Clone, Copy)]
pub struct SendOptions<'a> {
    pub system_prompt: Option<&'a str>,
    /// Model id or short alias; adapters resolve aliases best-effort.
    pub model: &'a str,
    /// Request extended-reasoning output where the vendor supports it.
    pub thinking_enabled: bool,
    pub max_tokens: u32,
}

impl<'a> SendOptions<'a> {
    pub fn new(model: &'a str) -> Self {
        Self {
            system_prompt: None,
            model,
            thinking_enabled: false,
            max_tokens: 4096,
        }
    }

    pub fn with_system(mut self, system_prompt: &'a str) -> Self {
        self.system_prompt = Some(system_prompt);
        self
    }
}

/// One LLM vendor behind the neutral event contract.
///
/// Adapters translate the outbound history and tool catalog into the vendor's
/// wire shapes and normalize the response stream into [`StreamEvent`]s. All
/// vendor divergence lives behind this trait; the agent loop holds a
/// `&dyn Provider` and never branches on vendor identity.
///
/// A transport or protocol failure aborts the `send` call (or surfaces as a
/// terminal stream item) without retry; retry policy, if any, lives above.
///
/// [`StreamEvent`]: super::streaming::StreamEvent
pub trait Provider: Send + Sync {
    /// Provider identifier (e.g. "anthropic", "openai").
    fn name(&self) -> &str;

    /// Map a short model alias to the vendor's concrete versioned id,
    /// falling back to the literal string when unmapped.
    fn resolve_model(&self, alias: &str) -> String {
        alias.to_string()
    }

    /// Tool-enabled streaming turn.
    fn send<'a>(
        &'a self,
        history: &'a [ChatMessage],
        tools: &'a [ToolSpec],
        options: SendOptions<'a>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<EventStream>> + Send + 'a>>;

    /// Tool-free streaming turn — a strict subset of [`send`](Self::send)
    /// that never emits tool-call events. Used for lightweight calls such as
    /// summarization.
    fn send_simple<'a>(
        &'a self,
        history: &'a [ChatMessage],
        options: SendOptions<'a>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<EventStream>> + Send + 'a>> {
        self.send(history, &[], options)
    }

    /// Discard the adapter's HTTP client so the next call builds a fresh one.
    fn reset_client(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_options_builder_defaults() {
        let options = SendOptions::new("sonnet");
        assert_eq!(options.model, "sonnet");
        assert!(options.system_prompt.is_none());
        assert!(!options.thinking_enabled);
        assert_eq!(options.max_tokens, 4096);
    }

    #[test]
    fn with_system_sets_prompt() {
        let options = SendOptions::new("sonnet").with_system("be brief");
        assert_eq!(options.system_prompt, Some("be brief"));
    }
}
