use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default interactive-approval timeout, in seconds.
pub const DEFAULT_APPROVAL_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Provider name passed to `llm::create_provider` (e.g. "anthropic").
    pub provider: String,
    /// Model identifier or short alias resolved by the provider adapter.
    pub model: String,
    /// Explicit API key. Usually unset; env vars are the normal path.
    pub api_key: Option<String>,
    /// Workspace directory for file tools and the permission store.
    pub workspace_dir: String,
    /// Default permission mode applied at the workspace level.
    pub default_mode: String,
    /// Seconds to wait for an interactive approval before denying.
    pub approval_timeout_secs: u64,
    /// Maximum agent-loop turns per run.
    pub max_turns: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            model: "sonnet".to_string(),
            api_key: None,
            workspace_dir: "~/.opspilot/workspace".to_string(),
            default_mode: "ask".to_string(),
            approval_timeout_secs: DEFAULT_APPROVAL_TIMEOUT_SECS,
            max_turns: 12,
        }
    }
}

impl Config {
    /// Platform config file path: `<config_dir>/opspilot/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "opspilot")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load from the default location, falling back to defaults when the
    /// file does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&content).map_err(|error| ConfigError::Load(error.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provider.trim().is_empty() {
            return Err(ConfigError::Validation("provider must not be empty".into()));
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::Validation("model must not be empty".into()));
        }
        if !matches!(
            self.default_mode.as_str(),
            "safe" | "ask" | "allow-all" | "inherit"
        ) {
            return Err(ConfigError::Validation(format!(
                "unknown default_mode '{}' (expected safe|ask|allow-all|inherit)",
                self.default_mode
            )));
        }
        if self.approval_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "approval_timeout_secs must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Workspace directory with `~` expanded.
    pub fn workspace_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.workspace_dir).into_owned())
    }
}

/// Resolve an API key for a provider from an explicit value or environment.
///
/// Resolution order:
/// 1. Explicitly provided key (trimmed, ignored if empty)
/// 2. Provider-specific environment variable
/// 3. Generic fallback (`OPSPILOT_API_KEY`)
pub fn resolve_api_key(provider: &str, explicit: Option<&str>) -> Option<String> {
    if let Some(key) = explicit.map(str::trim).filter(|key| !key.is_empty()) {
        return Some(key.to_string());
    }

    let candidates: &[&str] = match provider {
        "anthropic" => &["ANTHROPIC_API_KEY"],
        "openai" => &["OPENAI_API_KEY"],
        "gemini" | "google" => &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
        _ => &[],
    };

    for env_var in candidates.iter().chain(["OPSPILOT_API_KEY"].iter()) {
        if let Ok(value) = std::env::var(env_var) {
            let value = value.trim();
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }

    None
}
