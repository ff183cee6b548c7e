//! Text extraction from batch output lines.
//!
//! Output lines come in several shapes depending on which API version produced
//! them. Each shape is a pure strategy; strategies are tried in order and the
//! first one that yields non-empty text wins. Supporting a new shape means
//! appending a strategy here.

use serde_json::Value;

/// Pull the generated text out of one parsed output line
pub type ExtractStrategy = fn(&Value) -> Option<String>;

/// Known response shapes, current first
pub const STRATEGIES: &[(&str, ExtractStrategy)] = &[
    ("batch_response_body", batch_response_body),
    ("legacy_choices", legacy_choices),
    ("legacy_result_blocks", legacy_result_blocks),
];

fn non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn first_choice_content(value: &Value) -> Option<String> {
    value
        .get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()
        .and_then(non_empty)
}

/// `{"custom_id", "response": {"status_code": 200, "body": {"choices": [...]}}}`
fn batch_response_body(line: &Value) -> Option<String> {
    let response = line.get("response")?;
    if let Some(status) = response.get("status_code").and_then(Value::as_u64) {
        if status != 200 {
            return None;
        }
    }
    first_choice_content(response.get("body")?)
}

/// `{"custom_id", "choices": [...]}` or `{"custom_id", "response": {"choices": [...]}}`
fn legacy_choices(line: &Value) -> Option<String> {
    first_choice_content(line)
        .or_else(|| line.get("response").and_then(first_choice_content))
}

/// `{"custom_id", "result": {"message": {"content": [{"type": "text", "text": ...}]}}}`
fn legacy_result_blocks(line: &Value) -> Option<String> {
    let content = line.get("result")?.get("message")?.get("content")?;
    match content {
        Value::String(text) => non_empty(text),
        Value::Array(blocks) => {
            let text: Vec<&str> = blocks
                .iter()
                .filter_map(|block| block.get("text").and_then(Value::as_str))
                .collect();
            non_empty(&text.join(""))
        }
        _ => None,
    }
}

/// Run the strategies in order; returns the winning strategy name with the text
pub fn extract_text(line: &Value) -> Option<(&'static str, String)> {
    STRATEGIES
        .iter()
        .find_map(|(name, strategy)| strategy(line).map(|text| (*name, text)))
}

/// The request id echoed on an output line
pub fn custom_id(line: &Value) -> Option<&str> {
    line.get("custom_id")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|id| !id.is_empty())
}
