//! Deterministic cleanup of generation output.
//!
//! Extraction is deliberately lenient: any parse or validation failure yields
//! the shape's `Default` instance instead of an error, so one malformed field
//! never aborts a multi-section run. Callers that need to distinguish "empty
//! because absent" from "empty because malformed" can inspect
//! [`extract_value`] directly.

use std::sync::LazyLock;

use regex::Regex;
use serde::de::DeserializeOwned;

use crate::provider::GenerationOutput;

static FENCE_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^```[A-Za-z]*[ \t]*\n?").expect("fence-open pattern"));
static FENCE_CLOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n?```[ \t]*$").expect("fence-close pattern"));
static HORIZONTAL_RULE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[-*]{3,}[ \t]*$").expect("horizontal-rule pattern"));
static EXCESS_BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t]*\n([ \t]*\n)+").expect("blank-line pattern"));

/// Coerce generation output into `T`.
///
/// The fast path reuses a structured object the provider already validated;
/// otherwise the raw text is stripped of code fences, the outermost `{...}`
/// span is parsed as JSON, and the result is deserialized into `T`.
pub fn extract_structured<T>(output: &GenerationOutput) -> T
where
    T: DeserializeOwned + Default,
{
    if let Some(structured) = &output.structured
        && let Ok(parsed) = serde_json::from_value::<T>(structured.clone())
    {
        return parsed;
    }

    match extract_value(&output.text) {
        Some(value) => serde_json::from_value(value).unwrap_or_default(),
        None => T::default(),
    }
}

/// Locate and parse the JSON object embedded in free-form model output.
pub fn extract_value(raw: &str) -> Option<serde_json::Value> {
    let cleaned = strip_code_fences(raw);
    let span = json_span(&cleaned)?;
    serde_json::from_str(span).ok()
}

/// Remove a leading/trailing triple-backtick fence (optionally tagged, e.g.
/// ```` ```json ````) without touching fences in the middle of the text.
pub fn strip_code_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_open = FENCE_OPEN.replace(trimmed, "");
    FENCE_CLOSE.replace(&without_open, "").trim().to_string()
}

/// Greedy outermost `{...}` span, tolerating prose before and after.
fn json_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end >= start).then(|| &text[start..=end])
}

/// Cleanup for markdown destined for the report: strips an enclosing fence,
/// drops horizontal-rule artifacts, and collapses the blank lines left behind.
pub fn clean_markdown(content: &str) -> String {
    if content.trim().is_empty() {
        return String::new();
    }

    let unfenced = strip_code_fences(content);
    let without_rules = HORIZONTAL_RULE.replace_all(&unfenced, "");
    EXCESS_BLANK_LINES
        .replace_all(&without_rules, "\n\n")
        .trim()
        .to_string()
}
