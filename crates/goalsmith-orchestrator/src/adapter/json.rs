//! Pulls a JSON object out of free-form model output.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static FENCED_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)```").expect("fence regex should be valid"));

static OBJECT_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{.*\}").expect("object regex should be valid"));

static TRAILING_COMMA_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",\s*([}\]])").expect("trailing comma regex should be valid"));

/// Removes trailing commas and anything after the last closing brace or bracket.
pub fn clean_json_str(s: &str) -> String {
    let cleaned = TRAILING_COMMA_REGEX.replace_all(s, "$1");
    match cleaned.rfind(['}', ']']) {
        Some(last) => cleaned[..=last].to_string(),
        None => cleaned.into_owned(),
    }
}

/// Finds the JSON object in `text` and parses it.
///
/// A fenced block wins over surrounding prose. Otherwise the span from the
/// first `{` to the last `}` is taken.
pub fn extract_json(text: &str) -> Result<Value, String> {
    let text = text.trim();
    let body = FENCED_REGEX
        .captures(text)
        .and_then(|c| c.get(1))
        .map_or(text, |m| m.as_str().trim());

    let candidate = if body.starts_with('{') && body.ends_with('}') {
        body
    } else {
        OBJECT_REGEX.find(body).map(|m| m.as_str()).ok_or_else(|| "no JSON object found in output".to_string())?
    };

    serde_json::from_str(&clean_json_str(candidate)).map_err(|e| format!("invalid JSON: {e}"))
}
