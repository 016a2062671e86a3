use super::anthropic::AnthropicProvider;
use super::gemini::GeminiProvider;
use super::openai::OpenAiProvider;
use super::traits::Provider;
use crate::config;
use crate::error::ProviderError;

/// Build a provider adapter by name.
///
/// `name` is matched case-insensitively. `custom:<base-url>` selects the
/// OpenAI-compatible adapter pointed at an arbitrary endpoint (local
/// runtimes, proxies). The API key is resolved from the explicit value or
/// the provider's environment variables.
pub fn create_provider(
    name: &str,
    explicit_api_key: Option<&str>,
) -> Result<Box<dyn Provider>, ProviderError> {
    let trimmed = name.trim();
    let normalized = trimmed.to_lowercase();

    if normalized.starts_with("custom:") {
        let base_url = trimmed["custom:".len()..].trim();
        if base_url.is_empty() {
            return Err(ProviderError::Unknown(name.to_string()));
        }
        let api_key = config::resolve_api_key("custom", explicit_api_key);
        return Ok(Box::new(OpenAiProvider::with_base_url(
            "custom",
            base_url,
            api_key.as_deref(),
        )));
    }

    let api_key = config::resolve_api_key(&normalized, explicit_api_key);
    match normalized.as_str() {
        "anthropic" | "claude" => Ok(Box::new(AnthropicProvider::new(api_key.as_deref()))),
        "openai" => Ok(Box::new(OpenAiProvider::new(api_key.as_deref()))),
        "gemini" | "google" => Ok(Box::new(GeminiProvider::new(api_key.as_deref()))),
        _ => Err(ProviderError::Unknown(name.to_string())),
    }
}
