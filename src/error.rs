use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Structured error hierarchy for opspilot.
///
/// Each subsystem defines its own error variant. Library callers can match on
/// these to decide recovery strategy; internal code continues to use
/// `anyhow::Result` for ad-hoc context chains.
#[derive(Debug, Error)]
pub enum PilotError {
    // ── Config ───────────────────────────────────────────────────────────
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    // ── LLM / Provider ──────────────────────────────────────────────────
    #[error("provider: {0}")]
    Provider(#[from] ProviderError),

    // ── Tools ───────────────────────────────────────────────────────────
    #[error("tool: {0}")]
    Tool(#[from] ToolError),

    // ── Permissions ─────────────────────────────────────────────────────
    #[error("permission: {0}")]
    Permission(#[from] PermissionError),

    // ── Generic fallthrough (wraps anyhow for interop) ──────────────────
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ─── Config errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

// ─── Provider errors ────────────────────────────────────────────────────────

/// Terminal agent-loop failures must let the caller tell "no credentials"
/// apart from transport failures and malformed responses; only the first is
/// actionable by the user.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider {provider} credentials not configured: {hint}")]
    MissingCredentials { provider: String, hint: String },

    #[error("provider {provider} request failed: {message}")]
    Transport { provider: String, message: String },

    #[error("provider {provider} returned a malformed response: {message}")]
    Malformed { provider: String, message: String },

    #[error("unknown provider: {0}")]
    Unknown(String),

    #[error("streaming error: {0}")]
    Streaming(String),
}

// ─── Tool errors ────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool {name} not found")]
    NotFound { name: String },

    #[error("tool {name} execution failed: {message}")]
    Execution { name: String, message: String },

    #[error("tool {name} denied: {reason}")]
    Denied { name: String, reason: String },
}

// ─── Permission errors ──────────────────────────────────────────────────────

/// Note: a permission *denial* is not an error — `PermissionEngine::check`
/// returns a normal decision value. These variants cover store and channel
/// failures only.
#[derive(Debug, Error)]
pub enum PermissionError {
    #[error("permission store: {0}")]
    Store(String),

    #[error("no approval channel available")]
    NoApprovalChannel,
}

// ─── Convenience re-exports ─────────────────────────────────────────────────

/// Shorthand result type for the crate.
pub type Result<T> = std::result::Result<T, PilotError>;
