use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::errors::OracleError;
use crate::llm::types::Decision;

static FENCED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```(?:json|JSON)?\s*(\{.*?\})\s*```").expect("fenced block regex must compile")
});

/// Pull a [`Decision`] out of the model's reply text.
///
/// Accepts bare JSON, JSON inside a fenced code block, or JSON surrounded by
/// prose. A top-level object with a `type` and no `action` is taken as the
/// action itself.
pub fn parse_decision(content: &str) -> Result<Decision, OracleError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(OracleError::MalformedResponse("empty reply".into()));
    }

    let value = candidates(trimmed)
        .into_iter()
        .find_map(|c| serde_json::from_str::<Value>(c).ok().filter(Value::is_object))
        .ok_or_else(|| OracleError::MalformedResponse(preview(trimmed)))?;

    let thinking = value
        .get("thinking")
        .or_else(|| value.get("reasoning"))
        .and_then(Value::as_str)
        .map(str::to_string);

    match value.get("action") {
        Some(action @ Value::Object(_)) => Ok(Decision {
            thinking,
            action: action.clone(),
        }),
        Some(_) => Err(OracleError::MalformedResponse("\"action\" is not an object".into())),
        None if value.get("type").is_some() => Ok(Decision {
            thinking,
            action: value,
        }),
        None => Err(OracleError::MalformedResponse(format!(
            "no action in reply: {}",
            preview(trimmed)
        ))),
    }
}

/// Fenced blocks first, then the whole text, then the outermost braces.
fn candidates(text: &str) -> Vec<&str> {
    let mut out: Vec<&str> = FENCED_RE
        .captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();
    out.push(text);
    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            out.push(&text[start..=end]);
        }
    }
    out
}

fn preview(text: &str) -> String {
    let head: String = text.chars().take(120).collect();
    if text.chars().count() > 120 {
        format!("{head}...")
    } else {
        head
    }
}
