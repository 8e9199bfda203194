use serde::Serialize;
use serde_json::{Map, Value};

use super::prompt::RESULT_KEYS;

pub const NOT_AVAILABLE: &str = "Not available";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisResult {
    pub diagnosis: Value,
    pub next_steps: Value,
    pub recommendations: Value,
}

impl AnalysisResult {
    /// Shape used when the model ignored the JSON instruction.
    pub fn from_raw_text(raw: &str) -> Self {
        Self {
            diagnosis: Value::from(raw),
            next_steps: Value::from(NOT_AVAILABLE),
            recommendations: Value::from(NOT_AVAILABLE),
        }
    }

    /// Values are kept exactly as the model sent them; only absent keys are filled.
    fn from_object(mut object: Map<String, Value>) -> Self {
        let mut take = |key: &str| object.remove(key).unwrap_or_else(|| Value::from(NOT_AVAILABLE));
        Self {
            diagnosis: take("diagnosis"),
            next_steps: take("next_steps"),
            recommendations: take("recommendations"),
        }
    }
}

/// Turns raw model output into an [`AnalysisResult`]. Never fails: output that
/// isn't a JSON object lands in `diagnosis` untouched.
pub fn reconcile(raw: &str) -> AnalysisResult {
    let candidate = strip_code_fence(raw.trim());

    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(object)) => {
            let missing: Vec<&str> = RESULT_KEYS
                .into_iter()
                .filter(|key| !object.contains_key(*key))
                .collect();
            if !missing.is_empty() {
                tracing::warn!("Model JSON missing keys {:?}, filling defaults", missing);
            }
            AnalysisResult::from_object(object)
        }
        Ok(other) => {
            tracing::warn!("Model returned JSON {} instead of an object", json_kind(&other));
            AnalysisResult::from_raw_text(raw)
        }
        Err(e) => {
            tracing::warn!("Model response is not JSON ({}), using raw text", e);
            AnalysisResult::from_raw_text(raw)
        }
    }
}

/// Strips one markdown fence wrapping the whole text, e.g. "```json\n{..}\n```".
/// The info word may sit on its own line or share the line with the body.
fn strip_code_fence(text: &str) -> &str {
    let Some(inner) = text
        .strip_prefix("```")
        .and_then(|rest| rest.strip_suffix("```"))
    else {
        return text;
    };

    match inner.split_once(char::is_whitespace) {
        Some((info, body)) if !info.is_empty() && info.chars().all(|c| c.is_ascii_alphanumeric()) => {
            body.trim()
        }
        _ => inner.trim(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
