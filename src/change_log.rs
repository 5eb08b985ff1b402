//! Field-level diff between two structured results.
//!
//! The update pipeline asks the model for a change log but never trusts it;
//! this local diff is the authoritative record handed back to callers.

use crate::enrich::RunOutput;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ChangeLogEntry {
    pub path: String,
    pub before: Option<String>,
    pub after: Option<String>,
}

/// Compare the four envelope fields plus every `data.<key>` across both
/// sides. Keys present on only one side compare against an absent value;
/// equal values produce no entry.
pub fn build_change_log(previous: &RunOutput, next: &RunOutput) -> Vec<ChangeLogEntry> {
    let mut changes = Vec::new();

    add(
        &mut changes,
        "clean_transcript",
        Some(json!(previous.clean_transcript)),
        Some(json!(next.clean_transcript)),
    );
    add(
        &mut changes,
        "summary",
        Some(json!(previous.summary)),
        Some(json!(next.summary)),
    );
    add(
        &mut changes,
        "actions",
        Some(json!(previous.actions)),
        Some(json!(next.actions)),
    );
    add(
        &mut changes,
        "tags",
        Some(json!(previous.tags)),
        Some(json!(next.tags)),
    );

    let empty = serde_json::Map::new();
    let prev_data = previous.data.as_object().unwrap_or(&empty);
    let next_data = next.data.as_object().unwrap_or(&empty);

    let mut keys: Vec<&String> = prev_data.keys().collect();
    for key in next_data.keys() {
        if !prev_data.contains_key(key) {
            keys.push(key);
        }
    }

    for key in keys {
        add(
            &mut changes,
            &format!("data.{}", key),
            prev_data.get(key).cloned(),
            next_data.get(key).cloned(),
        );
    }

    changes
}

fn add(changes: &mut Vec<ChangeLogEntry>, path: &str, before: Option<Value>, after: Option<Value>) {
    // Option distinguishes an absent key from an explicit null; the two are
    // not equal, matching the envelope's update semantics.
    if before == after {
        return;
    }
    changes.push(ChangeLogEntry {
        path: path.to_string(),
        before: stringify_value(before.as_ref()),
        after: stringify_value(after.as_ref()),
    });
}

/// Canonical string form: null stays null, strings pass through, everything
/// else serializes to JSON text.
fn stringify_value(value: Option<&Value>) -> Option<String> {
    let value = value?;
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(serde_json::to_string(other).unwrap_or_else(|_| other.to_string())),
    }
}
