use std::sync::LazyLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::ExtractError;

static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```([A-Za-z0-9_+-]*)[ \t]*\r?\n?([\s\S]*?)```").expect("valid fence regex"));

/// Parse the JSON value embedded in a model answer
///
/// Looks inside a fenced block first (one tagged `json` wins over an untagged
/// one), then narrows to the outermost object or array. Nothing is repaired:
/// if the narrowed text does not parse, the error carries the original input.
pub fn extract_json<T: DeserializeOwned>(raw: &str) -> Result<T, ExtractError> {
    debug!(raw_len = raw.len(), "extract_json: called");
    let trimmed = raw.trim();

    if trimmed.is_empty() {
        return Err(ExtractError::Parse {
            message: "empty response".to_string(),
            raw: raw.to_string(),
        });
    }

    let fenced = fenced_block(trimmed).unwrap_or(trimmed);
    let candidate = json_span(fenced).unwrap_or(fenced);

    serde_json::from_str(candidate).map_err(|e| {
        debug!(error = %e, "extract_json: parse failed");
        ExtractError::Parse {
            message: e.to_string(),
            raw: raw.to_string(),
        }
    })
}

fn fenced_block(text: &str) -> Option<&str> {
    let mut untagged = None;
    for caps in FENCE_RE.captures_iter(text) {
        let tag = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        let body = caps.get(2).map(|m| m.as_str().trim())?;
        if tag.eq_ignore_ascii_case("json") {
            debug!("fenced_block: json fence");
            return Some(body);
        }
        if tag.is_empty() && untagged.is_none() {
            untagged = Some(body);
        }
    }
    untagged
}

/// First `{` or `[` through the last matching closer of the same kind
fn json_span(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let close = if text[start..].starts_with('{') { '}' } else { ']' };
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}
