use anyhow::bail;
use serde_json::json;
use std::path::{Component, Path, PathBuf};

pub(crate) fn workspace_path_property() -> serde_json::Value {
    json!({
        "type": "string",
        "description": "Relative path to the file within the workspace"
    })
}

/// Resolve a tool-supplied relative path inside the workspace directory.
/// Absolute paths and any `..` traversal are rejected before the join, so
/// the result can never escape the workspace.
pub fn resolve_workspace_path(workspace_dir: &Path, raw: &str) -> anyhow::Result<PathBuf> {
    let raw = raw.trim();
    if raw.is_empty() {
        bail!("path must not be empty");
    }

    let candidate = Path::new(raw);
    if candidate.is_absolute() {
        bail!("absolute paths are not allowed: {raw}");
    }
    for component in candidate.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir => bail!("path traversal is not allowed: {raw}"),
            _ => bail!("invalid path: {raw}"),
        }
    }

    Ok(workspace_dir.join(candidate))
}

/// Extract a required string argument from tool input.
pub fn required_str<'a>(input: &'a serde_json::Value, key: &str) -> anyhow::Result<&'a str> {
    input
        .get(key)
        .and_then(serde_json::Value::as_str)
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| anyhow::anyhow!("missing required argument '{key}'"))
}
