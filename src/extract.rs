//! Best-effort extraction of the JSON payload from a model reply.
//!
//! Models wrap their answer in prose or markdown fences despite being told
//! not to. Extraction runs a fixed sequence of small steps; each one is a
//! plain function so it can be tested on its own. This is a heuristic, not a
//! JSON tokenizer: nested fenced blocks are not handled.

use once_cell::sync::Lazy;
use regex::Regex;

/// First fenced block, optionally tagged `json`. Lazy match, so the first
/// closing fence ends the block.
static FENCED_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").expect("valid fenced block regex"));

/// A line that starts with a fence marker.
static FENCE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^```.*$").expect("valid fence line regex"));

/// Outermost `[` .. `]` span. Greedy on purpose so nested arrays stay whole.
static ARRAY_SPAN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\[.*\]").expect("valid array span regex"));

/// Reduce a raw model reply to the text that should be handed to the JSON
/// parser. If nothing plausible is found the text is passed through and the
/// parser reports the failure.
pub fn extract_payload(raw: &str) -> String {
    let text = fenced_block(raw).unwrap_or_else(|| raw.trim().to_string());
    let text = strip_fence_lines(&text);

    if looks_like_json(&text) {
        return text;
    }

    match first_array_span(&text) {
        Some(span) => span.to_string(),
        None => text,
    }
}

/// Trimmed content of the first fenced block, if any.
pub fn fenced_block(text: &str) -> Option<String> {
    FENCED_BLOCK
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
}

/// Remove leftover fence marker lines and trim.
pub fn strip_fence_lines(text: &str) -> String {
    FENCE_LINE.replace_all(text, "").trim().to_string()
}

/// Already bracketed as a JSON array or object.
pub fn looks_like_json(text: &str) -> bool {
    (text.starts_with('[') && text.ends_with(']')) || (text.starts_with('{') && text.ends_with('}'))
}

/// From the first `[` to the last `]`.
pub fn first_array_span(text: &str) -> Option<&str> {
    ARRAY_SPAN.find(text).map(|m| m.as_str())
}
