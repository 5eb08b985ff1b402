//! Required-field coverage for a structured result.

use crate::enrich::RunOutput;
use crate::modes::ModeDefinition;
use serde::Serialize;
use serde_json::Value;

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct CoverageInfo {
    pub percent: u32,
    pub filled: usize,
    pub total: usize,
    pub missing: Vec<String>,
}

/// How much of the mode's required `data` surface holds a usable value.
pub fn compute_coverage(mode: &ModeDefinition, result: &RunOutput) -> CoverageInfo {
    let required: Vec<&str> = mode
        .data_schema
        .get("required")
        .and_then(Value::as_array)
        .map(|keys| keys.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let empty = serde_json::Map::new();
    let data = result.data.as_object().unwrap_or(&empty);

    let mut missing = Vec::new();
    let mut filled = 0;
    for key in &required {
        match data.get(*key) {
            Some(value) if is_filled(value) => filled += 1,
            _ => missing.push((*key).to_string()),
        }
    }

    let total = required.len();
    let percent = if total == 0 {
        100
    } else {
        ((filled as f64 / total as f64) * 100.0).round() as u32
    };

    CoverageInfo {
        percent,
        filled,
        total,
        missing,
    }
}

fn is_filled(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(text) => !text.trim().is_empty(),
        Value::Number(number) => number.as_f64().map(f64::is_finite).unwrap_or(false),
        Value::Bool(_) => true,
        Value::Array(items) => !items.is_empty() && items.iter().any(is_filled),
        Value::Object(map) => !map.is_empty(),
    }
}
