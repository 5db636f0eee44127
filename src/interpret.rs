// src/interpret.rs

use crate::error::BillError;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

/// First `{` through last `}`, across newlines.
static JSON_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("static regex"));

/// Best-effort recovery of the field map from a model reply.
///
/// Tries the whole reply as a JSON object first, then the outermost
/// brace-delimited block. On success the object is tagged with `filename`;
/// on failure the original reply rides along in the error.
pub fn interpret(reply: &str, filename: &str) -> Result<Map<String, Value>, BillError> {
    let mut fields = parse_object(reply)?;
    fields.insert("filename".to_string(), Value::String(filename.to_string()));
    Ok(fields)
}

fn parse_object(reply: &str) -> Result<Map<String, Value>, BillError> {
    // Strip markdown fences if the model added them despite instructions
    let trimmed = reply
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) {
        return Ok(map);
    }

    let Some(block) = JSON_BLOCK.find(trimmed) else {
        return Err(BillError::Parse {
            message: "Could not extract JSON from model output".to_string(),
            reply: reply.to_string(),
        });
    };

    match serde_json::from_str::<Value>(block.as_str()) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(BillError::Parse {
            message: "Model output JSON is not an object".to_string(),
            reply: reply.to_string(),
        }),
        Err(e) => Err(BillError::Parse {
            message: format!("Failed to parse model output as JSON: {e}"),
            reply: reply.to_string(),
        }),
    }
}
