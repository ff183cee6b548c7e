//! Tolerant JSON repair for generated payloads.
//!
//! Model output is untrusted text that is usually, but not always, JSON. This
//! stage runs before strict parsing and fixes the common defects: Markdown code
//! fences, prose around the object, trailing commas, unescaped quotes and raw
//! newlines inside strings, and truncated output with unbalanced brackets.
//! Valid JSON passes through unchanged.

use serde_json::Value;
use thiserror::Error;

/// Payload text that stayed unparsable after repair
#[derive(Debug, Error)]
#[error("Malformed payload: {reason}")]
pub struct MalformedPayload {
    pub reason: String,
}

/// Parse strictly, falling back to a repaired copy of the text
pub fn parse_payload(text: &str) -> Result<Value, MalformedPayload> {
    if let Ok(value) = serde_json::from_str(text) {
        return Ok(value);
    }
    let repaired = repair_json(text);
    serde_json::from_str(&repaired).map_err(|e| MalformedPayload {
        reason: e.to_string(),
    })
}

/// Best-effort rewrite of near-JSON text into JSON
pub fn repair_json(text: &str) -> String {
    let unfenced = strip_code_fence(text.trim());
    let body = slice_to_json(unfenced);
    balance(body)
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string ("json") on the opening fence line.
    let rest = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

/// Cut leading and trailing prose around the outermost object or array
fn slice_to_json(text: &str) -> &str {
    let Some(start) = text.find(|c| c == '{' || c == '[') else {
        return text;
    };
    let end = text
        .rfind(|c| c == '}' || c == ']')
        .filter(|end| *end > start)
        .map(|end| end + 1)
        .unwrap_or(text.len());
    // Anything JSON-looking after the last closer means truncation, not prose.
    let tail = &text[end..];
    if tail.contains(|c| matches!(c, '"' | '{' | '[' | ':')) {
        return &text[start..];
    }
    &text[start..end]
}

fn closes_string(rest: &[char]) -> bool {
    match rest.iter().find(|c| !c.is_whitespace()) {
        None => true,
        Some(c) => matches!(c, ',' | '}' | ']' | ':'),
    }
}

fn strip_trailing_comma(out: &mut String) {
    let trimmed_len = out.trim_end().len();
    if out[..trimmed_len].ends_with(',') {
        out.truncate(trimmed_len - 1);
    }
}

fn balance(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() + 8);
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            if escaped {
                out.push(c);
                escaped = false;
                continue;
            }
            match c {
                '\\' => {
                    out.push(c);
                    escaped = true;
                }
                '"' if closes_string(&chars[i + 1..]) => {
                    out.push(c);
                    in_string = false;
                }
                '"' => out.push_str("\\\""),
                '\n' => out.push_str("\\n"),
                '\r' => {}
                '\t' => out.push_str("\\t"),
                _ => out.push(c),
            }
            continue;
        }

        match c {
            '"' => {
                out.push(c);
                in_string = true;
            }
            '{' => {
                out.push(c);
                stack.push('}');
            }
            '[' => {
                out.push(c);
                stack.push(']');
            }
            '}' | ']' => {
                // Close anything left open inside this scope first.
                if !stack.contains(&c) {
                    continue;
                }
                while let Some(open) = stack.pop() {
                    strip_trailing_comma(&mut out);
                    out.push(open);
                    if open == c {
                        break;
                    }
                }
            }
            _ => out.push(c),
        }
    }

    if escaped {
        out.pop();
    }
    if in_string {
        out.push('"');
    }
    while let Some(open) = stack.pop() {
        strip_trailing_comma(&mut out);
        out.push(open);
    }
    out
}
