//! Structured Response Parsing
//!
//! Pulls a JSON object out of free-form model output and checks it against
//! a phase's required keys before deserializing.

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

/// Why a model response could not be used as-is.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseFailure {
    #[error("no JSON object in response")]
    NoJson,

    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("missing required field '{0}'")]
    MissingField(String),

    #[error("invalid content: {0}")]
    Invalid(String),
}

/// Extract the first complete JSON object from model output. A fenced
/// block is preferred when present; prose around the object is ignored.
pub fn extract_json_object(text: &str) -> Option<String> {
    let body = fenced_block(text).unwrap_or(text);
    leading_object(body).map(str::to_string)
}

/// Contents of the first ``` fence that contains a `{`.
fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let rest = &text[open + 3..];
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    let close = rest.find("```")?;
    let content = rest[..close].trim();
    content.contains('{').then_some(content)
}

/// The first balanced `{...}` span that decodes as JSON. If no span
/// decodes, the first balanced one is returned so the caller can report
/// the syntax error.
fn leading_object(text: &str) -> Option<&str> {
    let mut first_balanced = None;
    for (start, _) in text.match_indices('{') {
        let Some(span) = balanced_span(&text[start..]) else {
            continue;
        };
        if serde_json::from_str::<Value>(span).is_ok() {
            return Some(span);
        }
        first_balanced.get_or_insert(span);
    }
    first_balanced
}

/// Span from the opening brace at `text[0]` to its matching close, skipping
/// braces inside string literals.
fn balanced_span(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&text[..offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Decode a phase response: extract, check `required_keys`, deserialize.
pub fn parse_phase_json<T: DeserializeOwned>(
    raw: &str,
    required_keys: &[&str],
) -> Result<T, ParseFailure> {
    let json = extract_json_object(raw).ok_or(ParseFailure::NoJson)?;
    let value: Value =
        serde_json::from_str(&json).map_err(|e| ParseFailure::InvalidJson(e.to_string()))?;

    let object = value
        .as_object()
        .ok_or_else(|| ParseFailure::Invalid("top-level value is not an object".to_string()))?;
    for key in required_keys {
        match object.get(*key) {
            None | Some(Value::Null) => return Err(ParseFailure::MissingField(key.to_string())),
            _ => {}
        }
    }

    serde_json::from_value(value).map_err(|e| ParseFailure::Invalid(e.to_string()))
}

/// Render a loosely-typed field as text: strings as-is, lists joined.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        Value::Array(items) => items
            .iter()
            .map(value_to_text)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("; "),
        other => other.to_string(),
    }
}

/// Render a loosely-typed field as a list of non-empty strings.
pub fn value_to_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(value_to_text)
            .filter(|s| !s.is_empty())
            .collect(),
        Value::Null => Vec::new(),
        other => {
            let text = value_to_text(other);
            if text.is_empty() {
                Vec::new()
            } else {
                vec![text]
            }
        }
    }
}
